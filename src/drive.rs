//! Drive folder listing, used to rebuild the image catalog straight from the
//! folder that holds the product photos.

use anyhow::{Result, bail};
use serde::Deserialize;
use tracing::{info, warn};

use crate::fetch::{HttpClient, fetch_text};
use crate::source::{Cell, RawTable};

pub const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Lists image files in a Drive folder. `C` carries the credential.
pub struct DriveLister<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> DriveLister<C> {
    pub fn new(client: C) -> Self {
        Self::with_base_url(client, DRIVE_FILES_URL)
    }

    pub fn with_base_url(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Pages through the folder listing. If a later page fails, the files
    /// gathered so far are returned; a failure on the first page is an error.
    #[tracing::instrument(skip(self))]
    pub async fn list_images(&self, folder_id: &str) -> Result<Vec<DriveFile>> {
        let query = format!("'{folder_id}' in parents and (mimeType contains 'image/')");
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            let mut params = vec![
                ("q", query.as_str()),
                ("spaces", "drive"),
                ("fields", "nextPageToken, files(id, name)"),
                ("pageSize", "1000"),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let url = reqwest::Url::parse_with_params(&self.base_url, &params)?;

            let page: FileList = match fetch_text(&self.client, url.as_str())
                .await
                .and_then(|body| Ok(serde_json::from_str::<FileList>(&body)?))
            {
                Ok(page) => page,
                Err(e) if pages > 0 => {
                    warn!(error = %e, pages, "Listing interrupted, keeping files found so far");
                    break;
                }
                Err(e) => bail!("listing folder {folder_id} failed: {e:#}"),
            };

            pages += 1;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(images = files.len(), pages, "Drive folder listed");
        Ok(files)
    }
}

/// Shapes a listing like the image-catalog sheet: `(nombre, id)` rows.
pub fn to_table(files: &[DriveFile]) -> RawTable {
    RawTable::new(
        vec!["nombre".to_string(), "id".to_string()],
        files
            .iter()
            .map(|f| vec![Cell::Text(f.name.clone()), Cell::Text(f.id.clone())])
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stub::{Canned, StubClient};

    const PAGE_ONE: &str = r#"{"nextPageToken":"p2","files":[{"id":"1","name":"A.png"}]}"#;
    const PAGE_TWO: &str = r#"{"files":[{"id":"2","name":"B.jpg"}]}"#;

    fn lister(responses: Vec<Canned>) -> DriveLister<StubClient> {
        DriveLister::with_base_url(StubClient::new(responses), "https://drive.test/files")
    }

    #[test]
    fn test_file_list_page_parses() {
        let page: FileList = serde_json::from_str(
            r#"{"nextPageToken":"abc","files":[{"id":"1","name":"TF.414.png","webViewLink":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        assert_eq!(page.files[0].name, "TF.414.png");

        let last: FileList = serde_json::from_str(r#"{"files":[]}"#).unwrap();
        assert!(last.next_page_token.is_none());
    }

    #[test]
    fn test_listing_becomes_catalog_table() {
        let table = to_table(&[DriveFile {
            id: "1AbC".into(),
            name: "TF.414.png".into(),
        }]);
        assert_eq!(table.column("nombre"), Some(0));
        assert_eq!(table.rows[0][1], Cell::Text("1AbC".into()));
    }

    #[tokio::test]
    async fn test_list_images_follows_page_tokens() {
        let lister = lister(vec![Canned::ok(PAGE_ONE), Canned::ok(PAGE_TWO)]);

        let files = lister.list_images("FOLDER").await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["A.png", "B.jpg"]);

        let requests = lister.client.requests();
        assert_eq!(requests.len(), 2);
        let token = |i: usize| {
            requests[i]
                .1
                .query_pairs()
                .find(|(k, _)| k == "pageToken")
                .map(|(_, v)| v.into_owned())
        };
        assert_eq!(token(0), None);
        assert_eq!(token(1).as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_earlier_files() {
        let lister = lister(vec![Canned::ok(PAGE_ONE), Canned::with_status(500, "")]);

        let files = lister.list_images("FOLDER").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "1");
    }

    #[tokio::test]
    async fn test_first_page_failure_is_error() {
        let lister = lister(vec![Canned::with_status(401, "")]);
        assert!(lister.list_images("FOLDER").await.is_err());
    }
}
