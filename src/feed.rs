//! Feed registry: the fixed set of catalog feeds and where each one lives.

use std::fmt;
use std::str::FromStr;

use crate::config::RemoteIds;

/// One named category of catalog data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedKind {
    Products,
    Clients,
    Groups,
    Promotions,
    GroupCatalog,
    ImageCatalog,
    ClientFinance,
}

/// Where the local copy of a feed is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalSource {
    /// No local copy; the feed is remote-only.
    None,
    /// A workbook file. `sheet` of `None` means the first sheet.
    Sheet {
        file: &'static str,
        sheet: Option<&'static str>,
    },
    /// A workbook with one tab per group; every tab holds `column`.
    TabPerGroup {
        file: &'static str,
        column: &'static str,
    },
}

impl FeedKind {
    pub const ALL: [FeedKind; 7] = [
        FeedKind::Products,
        FeedKind::Clients,
        FeedKind::Groups,
        FeedKind::Promotions,
        FeedKind::GroupCatalog,
        FeedKind::ImageCatalog,
        FeedKind::ClientFinance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FeedKind::Products => "products",
            FeedKind::Clients => "clients",
            FeedKind::Groups => "groups",
            FeedKind::Promotions => "promotions",
            FeedKind::GroupCatalog => "group_catalog",
            FeedKind::ImageCatalog => "image_catalog",
            FeedKind::ClientFinance => "client_finance",
        }
    }

    /// Key under which the remote sheet id appears in the config file.
    pub fn config_key(self) -> &'static str {
        match self {
            FeedKind::Products => "productosId",
            FeedKind::Clients => "clientesPermisosId",
            FeedKind::Groups => "gruposId",
            FeedKind::Promotions => "promocionesId",
            FeedKind::GroupCatalog => "catalogoGruposId",
            FeedKind::ImageCatalog => "sheetId",
            FeedKind::ClientFinance => "clientesFinanzasId",
        }
    }

    /// Column layout the normalizer expects, key column first.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            FeedKind::Products => &[
                "CODIGO",
                "ARTICULO",
                "RUBRO",
                "BULTO",
                "P_LISTA_D",
                "P_LISTA_E",
                "P_LISTA_F",
            ],
            FeedKind::Clients => &["CUENTA", "NOMBRE", "CATEGORIAS", "LISTA_PRECIOS"],
            FeedKind::Groups => &["NOMBRE_GRUPO", "CLIENTES"],
            FeedKind::Promotions => &[
                "CODIGO_PRODUCTO",
                "TIPO_LISTA",
                "PRECIO_ESPECIAL",
                "VIGENCIA_HASTA",
                "GRUPOS",
            ],
            FeedKind::GroupCatalog => &["GRUPO", "Codigo_Producto"],
            FeedKind::ImageCatalog => &["nombre", "id"],
            FeedKind::ClientFinance => &[
                "Cliente_ID",
                "Nombre_Cliente",
                "Vendedor",
                "PG_Prom_3M",
                "CP_Este_Mes",
                "Saldo_Total",
                "PG_Este_Mes",
                "Cupo_Mes",
                "Ult_Operacion",
            ],
        }
    }

    pub fn local_source(self) -> LocalSource {
        match self {
            FeedKind::Products => LocalSource::Sheet {
                file: "PRODUCTOS.xlsx",
                sheet: None,
            },
            FeedKind::Clients => LocalSource::Sheet {
                file: "CLIENTES_PERMISOS.xlsx",
                sheet: None,
            },
            FeedKind::Groups => LocalSource::Sheet {
                file: "GRUPOS_CLIENTES.xlsx",
                sheet: None,
            },
            FeedKind::Promotions => LocalSource::Sheet {
                file: "PROMOCIONES.xlsx",
                sheet: None,
            },
            FeedKind::GroupCatalog => LocalSource::TabPerGroup {
                file: "CATALOGOS_GRUPOS.xlsx",
                column: "Codigo_Producto",
            },
            FeedKind::ImageCatalog => LocalSource::None,
            FeedKind::ClientFinance => LocalSource::Sheet {
                file: "clientes_finanzas.xlsx",
                sheet: None,
            },
        }
    }

    pub fn output_file(self) -> &'static str {
        match self {
            FeedKind::Products => "products.json",
            FeedKind::Clients => "clients.json",
            FeedKind::Groups => "groups.json",
            FeedKind::Promotions => "promotions.json",
            FeedKind::GroupCatalog => "group_catalog.json",
            FeedKind::ImageCatalog => "image_catalog.json",
            FeedKind::ClientFinance => "clientes_finanzas.json",
        }
    }

    /// Top-level key the records are nested under in the output file, if any.
    pub fn nested_key(self) -> Option<&'static str> {
        match self {
            FeedKind::Groups => Some("groups"),
            FeedKind::Promotions => Some("promotions"),
            FeedKind::ImageCatalog => Some("images"),
            FeedKind::ClientFinance => Some("clientes"),
            _ => None,
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeedKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<_> = FeedKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown feed '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// A configured feed: its kind plus the remote sheet id, when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub kind: FeedKind,
    pub remote_id: Option<String>,
    pub local: LocalSource,
}

impl Feed {
    pub fn new(kind: FeedKind, remote_id: Option<String>) -> Self {
        Self {
            kind,
            remote_id,
            local: kind.local_source(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn has_local_fallback(&self) -> bool {
        self.local != LocalSource::None
    }
}

/// All feeds for a run, built once at startup.
#[derive(Debug, Clone)]
pub struct FeedRegistry {
    feeds: Vec<Feed>,
}

impl FeedRegistry {
    /// Builds every known feed, attaching remote ids found in `ids`.
    pub fn from_remote_ids(ids: &RemoteIds) -> Self {
        let feeds = FeedKind::ALL
            .into_iter()
            .map(|kind| Feed::new(kind, ids.get(kind.config_key()).map(str::to_string)))
            .collect();
        Self { feeds }
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    /// Restricts the registry to `kinds`; an empty slice keeps every feed.
    pub fn select(&self, kinds: &[FeedKind]) -> Vec<Feed> {
        self.feeds
            .iter()
            .filter(|f| kinds.is_empty() || kinds.contains(&f.kind))
            .cloned()
            .collect()
    }
}
