//! Purpose: Model the JSON-API envelopes spoken by the vector service.
//! Exports: `Resource`, `Document`, `NewResource`, `jsonapi_document`, `jsonapi_collection`.
//! Role: Shared envelope types for request bodies and response parsing.
//! Invariants: Request documents omit `id` when none is supplied.
use super::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Resource<A> {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub attributes: A,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Document<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NewResource<A> {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: A,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorDocument {
    #[serde(default)]
    pub errors: Vec<ErrorObject>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorObject {
    pub status: Option<Value>,
    pub title: Option<String>,
    pub detail: Option<String>,
}

impl ErrorDocument {
    /// Joins the `detail` (or `title`) of each error into one line.
    pub fn summary(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|err| err.detail.as_deref().or(err.title.as_deref()))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

pub fn jsonapi_document<A: Serialize>(
    kind: &str,
    attributes: A,
    id: Option<String>,
) -> Document<NewResource<A>> {
    Document {
        data: NewResource {
            kind: kind.to_string(),
            attributes,
            id,
        },
        meta: None,
    }
}

pub fn jsonapi_collection<A: Serialize>(
    kind: &str,
    attributes: Vec<A>,
    ids: Option<Vec<String>>,
) -> Result<Document<Vec<NewResource<A>>>, Error> {
    let ids: Vec<Option<String>> = match ids {
        Some(ids) => {
            if ids.len() != attributes.len() {
                return Err(Error::new(ErrorKind::Usage).with_message(format!(
                    "different number of resources given than ids: {} vs {}",
                    attributes.len(),
                    ids.len()
                )));
            }
            ids.into_iter().map(Some).collect()
        }
        None => vec![None; attributes.len()],
    };
    let data = attributes
        .into_iter()
        .zip(ids)
        .map(|(attributes, id)| NewResource {
            kind: kind.to_string(),
            attributes,
            id,
        })
        .collect();
    Ok(Document { data, meta: None })
}
