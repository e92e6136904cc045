//! STAC API item search over HTTP.
//!
//! One `POST <api>/search` per [`CatalogQuery`]. Pages are followed through
//! `rel = "next"` links until `limit` items are collected or the server runs
//! out. Items without a footprint are dropped with a warning; items without
//! a cloud cover property keep `NaN`, which ranks them last.

use std::time::Duration;

use satfeat_core::{
    Catalog, CatalogQuery, Geometry, SatfeatError, SatfeatResult, SceneCandidate, SceneRef,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const DEFAULT_CLOUD_COVER_PROPERTY: &str = "eo:cloud_cover";

/// Pages fetched per query before giving up on `next` links.
const MAX_PAGES: usize = 50;

pub struct StacCatalog {
    api_url: String,
    cloud_cover_property: String,
    agent: ureq::Agent,
}

impl StacCatalog {
    pub fn new(api_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(120))
            .build();
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            cloud_cover_property: DEFAULT_CLOUD_COVER_PROPERTY.to_string(),
            agent,
        }
    }

    pub fn with_cloud_cover_property(mut self, property: impl Into<String>) -> Self {
        self.cloud_cover_property = property.into();
        self
    }

    pub fn search_url(&self) -> String {
        format!("{}/search", self.api_url)
    }

    /// Request body for the first page.
    pub fn request_body(&self, query: &CatalogQuery) -> Value {
        json!({
            "collections": [query.collection_id],
            "intersects": query.intersects.to_geojson(),
            "datetime": query.datetime_range,
            "query": { self.cloud_cover_property.as_str(): { "lt": query.cloud_cover_lt } },
            "limit": query.limit,
        })
    }

    fn post(&self, url: &str, body: &Value) -> SatfeatResult<Value> {
        let response = self
            .agent
            .post(url)
            .send_json(body.clone())
            .map_err(|err| request_error("POST", url, err))?;
        response
            .into_json::<Value>()
            .map_err(|err| SatfeatError::Catalog(format!("invalid JSON from {url}: {err}")))
    }

    fn get(&self, url: &str) -> SatfeatResult<Value> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|err| request_error("GET", url, err))?;
        response
            .into_json::<Value>()
            .map_err(|err| SatfeatError::Catalog(format!("invalid JSON from {url}: {err}")))
    }
}

impl Catalog for StacCatalog {
    fn search(&self, query: &CatalogQuery) -> SatfeatResult<Vec<SceneCandidate>> {
        let mut url = self.search_url();
        let mut body = Some(self.request_body(query));
        let mut candidates = Vec::new();

        for page in 0..MAX_PAGES {
            let response = match &body {
                Some(body) => self.post(&url, body)?,
                None => self.get(&url)?,
            };
            candidates.extend(parse_items(
                &response,
                &query.collection_id,
                &self.cloud_cover_property,
            )?);
            debug!(page, items = candidates.len(), "STAC search page for {}", query.datetime_range);

            if candidates.len() >= query.limit {
                candidates.truncate(query.limit);
                break;
            }
            match next_link(&response, body.as_ref()) {
                Some((next_url, next_body)) => {
                    url = next_url;
                    body = next_body;
                }
                None => break,
            }
        }
        Ok(candidates)
    }
}

fn request_error(method: &str, url: &str, err: ureq::Error) -> SatfeatError {
    match err {
        ureq::Error::Status(code, response) => {
            let detail = response.into_string().unwrap_or_default();
            SatfeatError::Catalog(format!("{method} {url} returned HTTP {code}: {detail}"))
        }
        other => SatfeatError::Catalog(format!("{method} {url} failed: {other}")),
    }
}

/// Candidates from one `FeatureCollection` page.
pub fn parse_items(
    response: &Value,
    collection: &str,
    cloud_cover_property: &str,
) -> SatfeatResult<Vec<SceneCandidate>> {
    let features = response["features"]
        .as_array()
        .ok_or_else(|| SatfeatError::Catalog("search response has no 'features' array".into()))?;

    let mut candidates = Vec::with_capacity(features.len());
    for feature in features {
        let id = feature["id"]
            .as_str()
            .ok_or_else(|| SatfeatError::Catalog("STAC item without 'id'".into()))?;
        let footprint = match Geometry::from_geojson(&feature["geometry"]) {
            Ok(geometry) => geometry,
            Err(err) => {
                warn!("skipping STAC item {id}: {err}");
                continue;
            }
        };
        let cloud_cover = feature["properties"][cloud_cover_property]
            .as_f64()
            .unwrap_or(f64::NAN);
        let item_collection = feature["collection"].as_str().unwrap_or(collection);

        let mut scene = SceneRef::new(id, item_collection);
        if let Some(assets) = feature["assets"].as_object() {
            for (key, asset) in assets {
                if let Some(href) = asset["href"].as_str() {
                    scene = scene.with_asset(key.as_str(), href);
                }
            }
        }
        candidates.push(SceneCandidate {
            scene,
            cloud_cover,
            footprint,
        });
    }
    Ok(candidates)
}

/// Follow-up request from a `rel = "next"` link. A link without a method
/// (or `GET`) is fetched as-is; a `POST` link merges its body into the
/// previous one when `merge` is set.
fn next_link(response: &Value, previous_body: Option<&Value>) -> Option<(String, Option<Value>)> {
    let link = response["links"]
        .as_array()?
        .iter()
        .find(|link| link["rel"].as_str() == Some("next"))?;
    let href = link["href"].as_str()?.to_string();
    let method = link["method"].as_str().unwrap_or("GET");
    if !method.eq_ignore_ascii_case("POST") {
        return Some((href, None));
    }

    let link_body = link["body"].as_object().cloned().unwrap_or_default();
    let merge = link["merge"].as_bool().unwrap_or(false);
    let body = match (merge, previous_body.and_then(Value::as_object)) {
        (true, Some(previous)) => {
            let mut merged = previous.clone();
            merged.extend(link_body);
            merged
        }
        _ => link_body,
    };
    Some((href, Some(Value::Object(body))))
}
