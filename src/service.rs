//! Service layer
//!
//! The four logical operations behind the transport shell: describe, clean,
//! persist, and reduce-and-visualize. Each takes raw file bytes plus a typed
//! options record and returns a serializable response. Option records keep
//! the wire field names of the public API and reject unknown fields.

use crate::analysis::{self, DatasetProfile};
use crate::cleaning::{CleaningConfig, DataCleaner, ImputeStrategy};
use crate::error::{Result, VisualdataError};
use crate::persistence::{IfExists, SqliteStore};
use crate::reduction::{self, ReductionMethod, ReductionRequest};
use crate::render::{self, RenderStore, RenderStoreConfig};
use crate::table::{self, FileFormat, TableLoader};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const STATUS_SUCCESS: &str = "success";

fn default_title() -> String {
    "Interactive visualization".to_string()
}

/// Cleaning options, as supplied by the caller
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleaningOptions {
    #[serde(rename = "supprimer_na", default)]
    pub drop_missing: bool,
    #[serde(rename = "supprimer_doublons", default)]
    pub drop_duplicates: bool,
    #[serde(rename = "strategie_imputation", default)]
    pub impute: Option<ImputeStrategy>,
}

impl CleaningOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VisualdataError::ConfigError(format!("invalid cleaning options: {e}")))
    }
}

/// Persistence options, as supplied by the caller
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistOptions {
    #[serde(rename = "chemin_bdd")]
    pub db_path: PathBuf,
    #[serde(rename = "nom_table")]
    pub table_name: String,
    #[serde(rename = "si_existe", default = "PersistOptions::default_if_exists")]
    pub if_exists: IfExists,
}

impl PersistOptions {
    fn default_if_exists() -> IfExists {
        IfExists::Fail
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VisualdataError::ConfigError(format!("invalid persistence options: {e}")))
    }
}

/// Visualization options, as supplied by the caller
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisualizeOptions {
    #[serde(rename = "colonne_couleur", default)]
    pub color_column: Option<String>,
    #[serde(rename = "titre", default = "default_title")]
    pub title: String,
    #[serde(rename = "perplexite", default = "VisualizeOptions::default_perplexity")]
    pub perplexity: f64,
    #[serde(
        rename = "n_neighbor",
        alias = "n_neighbors",
        alias = "n_voisins",
        default = "VisualizeOptions::default_n_neighbors"
    )]
    pub n_neighbors: usize,
    #[serde(rename = "dist_min", default = "VisualizeOptions::default_min_dist")]
    pub min_dist: f64,
}

impl VisualizeOptions {
    fn default_perplexity() -> f64 {
        reduction::DEFAULT_PERPLEXITY
    }

    fn default_n_neighbors() -> usize {
        reduction::DEFAULT_N_NEIGHBORS
    }

    fn default_min_dist() -> f64 {
        reduction::DEFAULT_MIN_DIST
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VisualdataError::ConfigError(format!("invalid visualization options: {e}")))
    }
}

impl Default for VisualizeOptions {
    fn default() -> Self {
        Self {
            color_column: None,
            title: default_title(),
            perplexity: Self::default_perplexity(),
            n_neighbors: Self::default_n_neighbors(),
            min_dist: Self::default_min_dist(),
        }
    }
}

/// Response of the describe operation
#[derive(Debug, Serialize)]
pub struct DescribeResponse {
    pub statut: String,
    pub resume: Map<String, Value>,
    pub statistiques: Map<String, Value>,
}

/// Response of the clean operation
#[derive(Debug, Serialize)]
pub struct CleanResponse {
    pub statut: String,
    pub message: String,
    pub donnees_nettoyees: Vec<Map<String, Value>>,
}

/// Response of the persist operation
#[derive(Debug, Serialize)]
pub struct PersistResponse {
    pub statut: String,
    pub message: String,
    pub chemin_bdd: String,
    pub nom_table: String,
}

/// Response of the reduce-and-visualize operation
#[derive(Debug, Serialize)]
pub struct VisualizeResponse {
    pub statut: String,
    pub methode_utilisee: String,
    pub message: String,
    pub url_rendu: String,
    pub contenu_html: String,
}

/// Entry point for the transport shell
pub struct DataService {
    render_store: RenderStore,
    reduction_timeout: Option<Duration>,
}

impl DataService {
    pub fn new(render_config: RenderStoreConfig) -> Result<Self> {
        Ok(Self {
            render_store: RenderStore::new(render_config)?,
            reduction_timeout: None,
        })
    }

    /// Bound every reduction by a wall-clock timeout
    pub fn with_reduction_timeout(mut self, timeout: Duration) -> Self {
        self.reduction_timeout = Some(timeout);
        self
    }

    pub fn render_store(&self) -> &RenderStore {
        &self.render_store
    }

    fn load(&self, bytes: &[u8], format: FileFormat) -> Result<DataFrame> {
        TableLoader::new().load(bytes, format)
    }

    /// Profile an uploaded dataset
    pub fn describe(&self, bytes: &[u8], format: FileFormat) -> Result<DescribeResponse> {
        let df = self.load(bytes, format)?;
        let profile = analysis::profile(&df)?;
        info!(rows = profile.shape.0, columns = profile.shape.1, "dataset described");
        Ok(describe_response(&profile))
    }

    /// Clean an uploaded dataset and return the serialized records
    pub fn clean(
        &self,
        bytes: &[u8],
        format: FileFormat,
        options: &CleaningOptions,
    ) -> Result<CleanResponse> {
        let df = self.load(bytes, format)?;
        let cleaner = DataCleaner::new(CleaningConfig {
            drop_missing: options.drop_missing,
            drop_duplicates: options.drop_duplicates,
            impute: options.impute,
        });
        let (cleaned, report) = cleaner.clean(&df)?;
        let records = table::to_records(&cleaned)?;

        let message = format!(
            "Cleaning complete: {} duplicate rows removed, {} rows dropped, {} cells imputed.",
            report.duplicates_removed, report.rows_dropped, report.cells_imputed
        );
        info!(
            duplicates_removed = report.duplicates_removed,
            rows_dropped = report.rows_dropped,
            cells_imputed = report.cells_imputed,
            rows = cleaned.height(),
            "dataset cleaned"
        );

        Ok(CleanResponse {
            statut: STATUS_SUCCESS.to_string(),
            message,
            donnees_nettoyees: records,
        })
    }

    /// Persist an uploaded dataset into a SQLite table
    pub fn persist(
        &self,
        bytes: &[u8],
        format: FileFormat,
        options: &PersistOptions,
    ) -> Result<PersistResponse> {
        let df = self.load(bytes, format)?;
        let mut store = SqliteStore::open(&options.db_path)?;
        let rows = store.save(&df, &options.table_name, options.if_exists)?;

        Ok(PersistResponse {
            statut: STATUS_SUCCESS.to_string(),
            message: format!("{rows} rows saved to table '{}'.", options.table_name),
            chemin_bdd: options.db_path.display().to_string(),
            nom_table: options.table_name.clone(),
        })
    }

    /// Reduce an uploaded dataset to 2 or 3 dimensions and persist the
    /// interactive render
    pub fn reduce_and_visualize(
        &self,
        bytes: &[u8],
        format: FileFormat,
        method: ReductionMethod,
        n_components: usize,
        options: &VisualizeOptions,
    ) -> Result<VisualizeResponse> {
        let df = self.load(bytes, format)?;
        let request = ReductionRequest {
            method,
            n_components,
            color_column: options.color_column.clone(),
            title: options.title.clone(),
            perplexity: options.perplexity,
            n_neighbors: options.n_neighbors,
            min_dist: options.min_dist,
            timeout: self.reduction_timeout,
            ..Default::default()
        };

        let outcome = reduction::reduce(&df, &request)?;
        let document = render::scatter_document(&outcome.embedding, &options.title, outcome.method_used);
        let stored = self.render_store.save(&document)?;

        let method_name = outcome.method_used.to_string();
        info!(
            method = %method_name,
            dims = n_components,
            render_id = %stored.id,
            "visualization created"
        );

        Ok(VisualizeResponse {
            statut: STATUS_SUCCESS.to_string(),
            methode_utilisee: method_name.clone(),
            message: format!(
                "{n_components}D {} render created successfully.",
                method_name.to_uppercase()
            ),
            url_rendu: stored.url,
            contenu_html: document,
        })
    }
}

fn describe_response(profile: &DatasetProfile) -> DescribeResponse {
    let mut types = Map::new();
    let mut missing = Map::new();
    let mut statistiques = Map::new();
    for column in &profile.columns {
        types.insert(column.name.clone(), Value::from(column.kind.to_string()));
        missing.insert(column.name.clone(), Value::from(column.missing));
        statistiques.insert(
            column.name.clone(),
            serde_json::to_value(&column.stats).unwrap_or(Value::Null),
        );
    }

    let mut resume = Map::new();
    resume.insert(
        "shape".to_string(),
        serde_json::json!([profile.shape.0, profile.shape.1]),
    );
    resume.insert(
        "columns".to_string(),
        serde_json::json!(profile.columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>()),
    );
    resume.insert("types".to_string(), Value::Object(types));
    resume.insert("missing_values".to_string(), Value::Object(missing));
    resume.insert("duplicates".to_string(), Value::from(profile.duplicate_rows));

    DescribeResponse {
        statut: STATUS_SUCCESS.to_string(),
        resume,
        statistiques,
    }
}
