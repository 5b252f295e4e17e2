//! HTTP plumbing shared by the sheet reader, the Drive lister and the image
//! probe. Auth wrappers in [`auth`] decorate any [`HttpClient`].

mod basic;
mod client;
pub mod auth;
#[cfg(test)]
pub(crate) mod stub;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Result, bail};

/// GETs `url` and returns the body as text. Non-2xx statuses are errors.
pub async fn fetch_text<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<String> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        bail!("GET {url} returned status {status}");
    }
    Ok(resp.text().await?)
}

/// Issues a HEAD request for `url`; only the headers are transferred.
pub async fn head<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<reqwest::Response> {
    let req = reqwest::Request::new(reqwest::Method::HEAD, url.parse()?);

    let resp = client.execute(req).await?;
    if !resp.status().is_success() {
        bail!("HEAD {url} returned status {}", resp.status());
    }
    Ok(resp)
}
