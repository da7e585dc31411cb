//! Interactive render generation
//!
//! Turns an [`Embedding`] into a self-contained HTML document driving a
//! plotly.js scatter (2D) or scatter3d (3D) plot. The plotly library itself
//! is loaded from its CDN; everything else is inlined. Categorical colors
//! become one trace per category with a legend; numeric colors use a
//! continuous colorscale with a colorbar.

pub mod store;

pub use store::{RenderStore, RenderStoreConfig, StoredRender};

use crate::reduction::{ColorValues, Embedding, ReductionMethod};
use serde_json::{json, Value};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Build the interactive scatter document for an embedding
pub fn scatter_document(embedding: &Embedding, title: &str, method: ReductionMethod) -> String {
    let dims = embedding.axis_labels.len();
    let full_title = format!(
        "{} ({} {}D)",
        title,
        method.to_string().to_uppercase(),
        dims
    );

    let traces = build_traces(embedding, dims);
    let layout = build_layout(embedding, &full_title, dims);

    let mut payload = json!({ "data": traces, "layout": layout }).to_string();
    // Keep inlined JSON from terminating the script tag early
    payload = payload.replace("</", "<\\/");

    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{}</title>\n\
         <script src=\"{}\"></script>\n\
         <style>html, body, #plot {{ height: 100%; margin: 0; }}</style>\n\
         </head>\n\
         <body>\n\
         <div id=\"plot\"></div>\n\
         <script>\n\
         var figure = {};\n\
         Plotly.newPlot(\"plot\", figure.data, figure.layout, {{responsive: true}});\n\
         </script>\n\
         </body>\n\
         </html>\n",
        escape_html(&full_title),
        PLOTLY_CDN,
        payload
    )
}

fn build_traces(embedding: &Embedding, dims: usize) -> Vec<Value> {
    let hover: Vec<String> = (0..embedding.points.len()).map(|i| i.to_string()).collect();

    match &embedding.color {
        Some(ColorValues::Text(values)) => {
            // One trace per category, in first-seen order
            let mut categories: Vec<(&str, Vec<usize>)> = Vec::new();
            for (i, value) in values.iter().enumerate() {
                match categories.iter_mut().find(|(name, _)| *name == value.as_str()) {
                    Some((_, indices)) => indices.push(i),
                    None => categories.push((value.as_str(), vec![i])),
                }
            }

            categories
                .into_iter()
                .map(|(name, indices)| {
                    let mut trace = base_trace(embedding, dims, Some(indices.as_slice()));
                    trace["name"] = json!(name);
                    trace["text"] =
                        json!(indices.iter().map(|&i| hover[i].clone()).collect::<Vec<_>>());
                    trace
                })
                .collect()
        }
        Some(ColorValues::Numeric(values)) => {
            let mut trace = base_trace(embedding, dims, None);
            trace["text"] = json!(hover);
            trace["marker"] = json!({
                "color": values,
                "colorscale": "Viridis",
                "showscale": true,
                "colorbar": { "title": embedding.color_column.as_deref().unwrap_or("") },
                "size": marker_size(dims),
            });
            vec![trace]
        }
        None => {
            let mut trace = base_trace(embedding, dims, None);
            trace["text"] = json!(hover);
            vec![trace]
        }
    }
}

/// Coordinate arrays for the full embedding or a subset of row indices
fn base_trace(embedding: &Embedding, dims: usize, indices: Option<&[usize]>) -> Value {
    let axis = |k: usize| -> Vec<f64> {
        match indices {
            Some(idx) => idx.iter().map(|&i| embedding.points[i][k]).collect(),
            None => embedding.points.iter().map(|p| p[k]).collect(),
        }
    };

    let mut trace = json!({
        "x": axis(0),
        "y": axis(1),
        "mode": "markers",
        "type": if dims == 3 { "scatter3d" } else { "scatter" },
        "marker": { "size": marker_size(dims) },
        "hovertemplate": "%{text}<extra></extra>",
    });
    if dims == 3 {
        trace["z"] = json!(axis(2));
    }
    trace
}

fn marker_size(dims: usize) -> u32 {
    if dims == 3 {
        4
    } else {
        7
    }
}

fn build_layout(embedding: &Embedding, title: &str, dims: usize) -> Value {
    let labels = &embedding.axis_labels;
    if dims == 3 {
        json!({
            "title": { "text": title },
            "scene": {
                "xaxis": { "title": { "text": labels[0] } },
                "yaxis": { "title": { "text": labels[1] } },
                "zaxis": { "title": { "text": labels[2] } },
            },
        })
    } else {
        json!({
            "title": { "text": title },
            "xaxis": { "title": { "text": labels[0] } },
            "yaxis": { "title": { "text": labels[1] } },
        })
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
