//! Integration tests for the full pipeline: describe, clean, and
//! reduce-and-visualize over realistic uploaded payloads.

use visualdata::cleaning::ImputeStrategy;
use visualdata::reduction::{self, auto::AutoSelector, ReductionMethod, ReductionRequest};
use visualdata::render::RenderStoreConfig;
use visualdata::service::{CleaningOptions, DataService, VisualizeOptions};
use visualdata::table::FileFormat;
use visualdata::VisualdataError;

// ============================================================================
// Fixtures
// ============================================================================

/// 150 rows, 4 numeric columns, 1 categorical column with 3 distinct values
fn dataset_csv(rows: usize) -> String {
    let mut csv = String::from("alpha,beta,gamma,delta,group\n");
    for i in 0..rows {
        let group = ["red", "green", "blue"][i % 3];
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            i as f64 * 0.5,
            (i as f64 * 0.3).sin(),
            (i as f64 * 0.7).cos(),
            (i % 7) as f64,
            group
        ));
    }
    csv
}

/// 140 distinct rows plus the first 10 repeated: 150 rows, 10 duplicates
fn dataset_with_duplicates() -> String {
    let base = dataset_csv(140);
    let mut lines: Vec<&str> = base.lines().collect();
    let repeats: Vec<&str> = lines[1..11].to_vec();
    lines.extend(repeats);
    let mut csv = lines.join("\n");
    csv.push('\n');
    csv
}

fn service() -> (tempfile::TempDir, DataService) {
    let dir = tempfile::tempdir().unwrap();
    let svc = DataService::new(RenderStoreConfig {
        dir: dir.path().to_path_buf(),
        base_url: "http://localhost:8080".to_string(),
    })
    .unwrap();
    (dir, svc)
}

// ============================================================================
// Scenario A: describe a 150x5 table
// ============================================================================

#[test]
fn test_describe_150_row_dataset() {
    let (_dir, svc) = service();
    let csv = dataset_csv(150);

    let response = svc.describe(csv.as_bytes(), FileFormat::Csv).unwrap();
    assert_eq!(response.statut, "success");
    assert_eq!(response.resume["shape"], serde_json::json!([150, 5]));
    assert_eq!(response.resume["duplicates"], serde_json::json!(0));
    assert_eq!(response.resume["types"]["alpha"], serde_json::json!("numeric"));
    assert_eq!(response.resume["types"]["group"], serde_json::json!("categorical"));

    // alpha is 0, 0.5, ..., 74.5: mean 37.25, min 0, max 74.5
    let alpha = &response.statistiques["alpha"];
    assert_eq!(alpha["count"], serde_json::json!(150));
    assert!((alpha["mean"].as_f64().unwrap() - 37.25).abs() < 1e-9);
    assert!((alpha["min"].as_f64().unwrap() - 0.0).abs() < 1e-9);
    assert!((alpha["max"].as_f64().unwrap() - 74.5).abs() < 1e-9);
    assert!((alpha["50%"].as_f64().unwrap() - 37.25).abs() < 1e-9);

    // group cycles red/green/blue starting at red: red appears 50 times
    let group = &response.statistiques["group"];
    assert_eq!(group["unique"], serde_json::json!(3));
    assert_eq!(group["top"], serde_json::json!("red"));
    assert_eq!(group["freq"], serde_json::json!(50));
}

// ============================================================================
// Scenario B: clean away 10 duplicated rows
// ============================================================================

#[test]
fn test_clean_removes_duplicates_and_missing() {
    let (_dir, svc) = service();
    let csv = dataset_with_duplicates();

    let options = CleaningOptions {
        drop_duplicates: true,
        impute: Some(ImputeStrategy::Median),
        ..Default::default()
    };
    let response = svc.clean(csv.as_bytes(), FileFormat::Csv, &options).unwrap();
    assert_eq!(response.statut, "success");
    assert_eq!(response.donnees_nettoyees.len(), 140);
    assert!(response.message.contains("10 duplicate rows removed"));

    // No missing values anywhere in the cleaned records
    for record in &response.donnees_nettoyees {
        assert!(record.values().all(|v| !v.is_null()));
    }
}

#[test]
fn test_clean_median_imputation_fills_gaps() {
    let (_dir, svc) = service();
    let csv = "x,y\n1,10\n2,\n3,30\n4,40\n";

    let options = CleaningOptions {
        impute: Some(ImputeStrategy::Median),
        ..Default::default()
    };
    let response = svc.clean(csv.as_bytes(), FileFormat::Csv, &options).unwrap();
    assert_eq!(response.donnees_nettoyees.len(), 4);
    // Median of 10, 30, 40
    assert_eq!(response.donnees_nettoyees[1]["y"], serde_json::json!(30.0));
}

#[test]
fn test_clean_drop_missing_leaves_complete_rows() {
    let (_dir, svc) = service();
    let csv = "x,y\n1,10\n2,\n3,30\n";

    let options = CleaningOptions {
        drop_missing: true,
        ..Default::default()
    };
    let response = svc.clean(csv.as_bytes(), FileFormat::Csv, &options).unwrap();
    assert_eq!(response.donnees_nettoyees.len(), 2);
    assert!(response.message.contains("1 rows dropped"));
}

// ============================================================================
// Scenario C: auto reduction of a 150x4 table to 3D
// ============================================================================

#[test]
fn test_reduce_and_visualize_auto_3d() {
    let (dir, svc) = service();
    let csv = dataset_csv(150);

    let options = VisualizeOptions {
        color_column: Some("group".to_string()),
        title: "Exploration".to_string(),
        ..Default::default()
    };
    let response = svc
        .reduce_and_visualize(csv.as_bytes(), FileFormat::Csv, ReductionMethod::Auto, 3, &options)
        .unwrap();

    assert_eq!(response.statut, "success");
    assert!(["pca", "tsne", "umap"].contains(&response.methode_utilisee.as_str()));
    assert!(response.url_rendu.starts_with("http://localhost:8080/renders/"));
    assert!(response.url_rendu.ends_with(".html"));
    assert!(response.contenu_html.contains("Plotly.newPlot"));
    assert!(response.contenu_html.contains("scatter3d"));

    // The document is durably stored under the URL's identifier
    let id = response
        .url_rendu
        .rsplit('/')
        .next()
        .unwrap()
        .trim_end_matches(".html");
    let stored = std::fs::read_to_string(dir.path().join(format!("{id}.html"))).unwrap();
    assert_eq!(stored, response.contenu_html);
}

#[test]
fn test_auto_embedding_has_150_rows_of_3_coordinates() {
    let csv = dataset_csv(150);
    let df = visualdata::table::TableLoader::new()
        .load(csv.as_bytes(), FileFormat::Csv)
        .unwrap();

    let request = ReductionRequest {
        method: ReductionMethod::Auto,
        n_components: 3,
        color_column: Some("group".to_string()),
        ..Default::default()
    };
    let outcome = reduction::reduce(&df, &request).unwrap();
    assert_eq!(outcome.embedding.points.len(), 150);
    assert!(outcome.embedding.points.iter().all(|p| p.len() == 3));
    assert_eq!(outcome.embedding.color.as_ref().unwrap().len(), 150);
    assert_ne!(outcome.method_used, ReductionMethod::Auto);
}

// ============================================================================
// Scenario D: perplexity must stay below the row count
// ============================================================================

#[test]
fn test_tsne_with_oversized_perplexity_fails() {
    let (_dir, svc) = service();
    let csv = dataset_csv(50);

    let options = VisualizeOptions {
        perplexity: 200.0,
        ..Default::default()
    };
    let err = svc
        .reduce_and_visualize(csv.as_bytes(), FileFormat::Csv, ReductionMethod::Tsne, 2, &options)
        .unwrap_err();
    assert!(matches!(err, VisualdataError::ReductionError(_)));
}

// ============================================================================
// Determinism and auto-selection boundaries
// ============================================================================

#[test]
fn test_visualization_is_reproducible() {
    let (_dir, svc) = service();
    let csv = dataset_csv(120);

    let options = VisualizeOptions::default();
    let first = svc
        .reduce_and_visualize(csv.as_bytes(), FileFormat::Csv, ReductionMethod::Tsne, 2, &options)
        .unwrap();
    let second = svc
        .reduce_and_visualize(csv.as_bytes(), FileFormat::Csv, ReductionMethod::Tsne, 2, &options)
        .unwrap();

    // Same payload and parameters: the embedded coordinates, and with them
    // the whole document, must be byte-identical across runs
    assert_eq!(first.contenu_html, second.contenu_html);
    assert_ne!(first.url_rendu, second.url_rendu);
}

#[test]
fn test_auto_selection_boundaries() {
    assert_eq!(AutoSelector::select(99, 10), ReductionMethod::Pca);
    assert_eq!(AutoSelector::select(100, 10), ReductionMethod::Tsne);
    assert_eq!(AutoSelector::select(2000, 10), ReductionMethod::Tsne);
    assert_eq!(AutoSelector::select(2001, 10), ReductionMethod::Umap);
    assert_eq!(AutoSelector::select(5000, 3), ReductionMethod::Pca);
    assert_eq!(AutoSelector::select(101, 51), ReductionMethod::Umap);
}

// ============================================================================
// Error surface
// ============================================================================

#[test]
fn test_describe_rejects_empty_upload() {
    let (_dir, svc) = service();
    let err = svc.describe(b"", FileFormat::Csv).unwrap_err();
    assert!(matches!(err, VisualdataError::ParseError(_)));
}

#[test]
fn test_visualize_rejects_unknown_color_column() {
    let (_dir, svc) = service();
    let csv = dataset_csv(30);

    let options = VisualizeOptions {
        color_column: Some("missing_column".to_string()),
        ..Default::default()
    };
    let err = svc
        .reduce_and_visualize(csv.as_bytes(), FileFormat::Csv, ReductionMethod::Pca, 2, &options)
        .unwrap_err();
    assert!(matches!(err, VisualdataError::ReductionError(_)));
}

#[test]
fn test_visualize_rejects_text_only_table() {
    let (_dir, svc) = service();
    let csv = "a,b\nx,y\nu,v\nw,z\n";

    let err = svc
        .reduce_and_visualize(
            csv.as_bytes(),
            FileFormat::Csv,
            ReductionMethod::Pca,
            2,
            &VisualizeOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, VisualdataError::ReductionError(_)));
}
