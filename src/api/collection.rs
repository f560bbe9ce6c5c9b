//! Purpose: Proxy a vector product as a lazily filtered `FeatureCollection`.
//! Exports: `FeatureCollection`, `Features`.
//! Role: Translates collection operations into `VectorService` calls; no local storage.
//! Invariants: `filter`/`limit` never mutate the receiver; they return a new collection.
//! Invariants: A new geometry replaces the old one; property expressions are ANDed.
//! Invariants: Nothing is fetched until `features()`, `copy()` or `delete_features()` runs.
#![allow(clippy::result_large_err)]

use super::feature::Feature;
use super::jobs::{CopyJob, DeleteJob};
use super::service::{
    FeatureQuery, Product, ProductAttributes, ProductSpec, ProductUpdate, VectorService,
};
use super::upload::UploadTask;
use crate::core::error::{Error, ErrorKind};
use crate::core::filter::Expression;
use crate::core::geometry::{GeoInterface, Geometry};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of features sent in one create request by `add`.
pub const ADD_BATCH_SIZE: usize = 100;

#[derive(Clone)]
pub struct FeatureCollection {
    client: Arc<dyn VectorService>,
    id: String,
    attributes: ProductAttributes,
    query: FeatureQuery,
}

impl FeatureCollection {
    /// Opens an existing product and loads its attributes.
    pub fn open(client: Arc<dyn VectorService>, id: impl Into<String>) -> Result<Self, Error> {
        let mut collection = Self {
            client,
            id: id.into(),
            attributes: ProductAttributes::default(),
            query: FeatureQuery::default(),
        };
        collection.refresh()?;
        Ok(collection)
    }

    pub fn from_product(client: Arc<dyn VectorService>, product: Product) -> Self {
        Self {
            client,
            id: product.id,
            attributes: product.attributes,
            query: FeatureQuery::default(),
        }
    }

    pub fn create(client: Arc<dyn VectorService>, spec: &ProductSpec) -> Result<Self, Error> {
        spec.validate()?;
        let product = client.create_product(spec)?;
        tracing::info!(product = %product.id, name = %product.attributes.name, "created product");
        Ok(Self::from_product(client, product))
    }

    /// Lists every product visible to the caller, walking pages until one comes back empty.
    pub fn list(client: Arc<dyn VectorService>) -> Result<Vec<Self>, Error> {
        let mut collections = Vec::new();
        let mut page = 1;
        // first page errors propagate; later 404s just mean we ran off the end
        let mut products = client.list_products(page)?;
        while !products.is_empty() {
            collections.extend(
                products
                    .into_iter()
                    .map(|product| Self::from_product(client.clone(), product)),
            );
            page += 1;
            products = match client.list_products(page) {
                Ok(products) => products,
                Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
                Err(err) => return Err(err),
            };
        }
        Ok(collections)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attributes(&self) -> &ProductAttributes {
        &self.attributes
    }

    pub fn name(&self) -> &str {
        &self.attributes.name
    }

    pub fn title(&self) -> &str {
        &self.attributes.title
    }

    pub fn description(&self) -> &str {
        &self.attributes.description
    }

    pub fn owners(&self) -> &[String] {
        &self.attributes.owners
    }

    pub fn readers(&self) -> &[String] {
        &self.attributes.readers
    }

    pub fn writers(&self) -> &[String] {
        &self.attributes.writers
    }

    pub fn query(&self) -> &FeatureQuery {
        &self.query
    }

    pub fn client(&self) -> &Arc<dyn VectorService> {
        &self.client
    }

    /// Returns a copy narrowed by `geometry` and/or `properties`.
    pub fn filter(&self, geometry: Option<Geometry>, properties: Option<Expression>) -> Self {
        let mut filtered = self.clone();
        if let Some(geometry) = geometry {
            filtered.query.geometry = Some(geometry);
        }
        if let Some(properties) = properties {
            filtered.query.query_expr = Some(match filtered.query.query_expr.take() {
                Some(existing) => existing.and(properties),
                None => properties,
            });
        }
        filtered
    }

    pub fn filter_geometry(&self, geometry: &impl GeoInterface) -> Result<Self, Error> {
        Ok(self.filter(Some(Geometry::from_geo(geometry)?), None))
    }

    pub fn filter_properties(&self, properties: Expression) -> Self {
        self.filter(None, Some(properties))
    }

    pub fn limit(&self, limit: u64) -> Self {
        let mut limited = self.clone();
        limited.query.query_limit = Some(limit);
        limited
    }

    /// Runs the query; the iterator reports the full result size via `len()`.
    ///
    /// The service rejects queries with no geometry, expression, or limit as `BadRequest`.
    pub fn features(&self) -> Result<Features, Error> {
        let page = self.client.search_features(&self.id, &self.query, None)?;
        let total = page.total.unwrap_or(page.features.len() as u64);
        let total = match self.query.query_limit {
            Some(limit) => total.min(limit),
            None => total,
        };
        Ok(Features {
            client: self.client.clone(),
            product_id: self.id.clone(),
            query: self.query.clone(),
            buffer: page.features.into(),
            continuation: page.continuation,
            total,
            yielded: 0,
            finished: false,
        })
    }

    /// Applies only the supplied fields, then merges the service's view back in.
    pub fn update(&mut self, update: &ProductUpdate) -> Result<(), Error> {
        update.validate()?;
        let patch = self.client.update_product(&self.id, update)?;
        self.attributes.merge(patch);
        Ok(())
    }

    pub fn replace(&mut self, spec: &ProductSpec) -> Result<(), Error> {
        spec.validate()?;
        let patch = self.client.replace_product(&self.id, spec)?;
        self.attributes.merge(patch);
        Ok(())
    }

    /// Reloads attributes; fields the service omits keep their current value.
    pub fn refresh(&mut self) -> Result<(), Error> {
        let patch = self.client.get_product(&self.id)?;
        self.attributes.merge(patch);
        Ok(())
    }

    pub fn delete(&self) -> Result<(), Error> {
        self.client.delete_product(&self.id)?;
        tracing::info!(product = %self.id, "deleted product");
        Ok(())
    }

    /// Adds features in batches of [`ADD_BATCH_SIZE`]; returns copies carrying the new ids.
    pub fn add(&self, features: &[Feature]) -> Result<Vec<Feature>, Error> {
        let mut added = Vec::with_capacity(features.len());
        for batch in features.chunks(ADD_BATCH_SIZE) {
            let attributes: Vec<_> = batch.iter().map(Feature::attributes).collect();
            let created = self.client.create_features(&self.id, &attributes)?;
            if created.len() != batch.len() {
                return Err(Error::new(ErrorKind::Internal)
                    .with_message(format!(
                        "service created {} features for a batch of {}",
                        created.len(),
                        batch.len()
                    ))
                    .with_product(self.id.clone()));
            }
            for (feature, document) in batch.iter().zip(created) {
                let mut copy = feature.clone();
                copy.id = document.id;
                added.push(copy);
            }
        }
        Ok(added)
    }

    /// Uploads newline-delimited GeoJSON; ingest continues asynchronously on the service.
    pub fn upload(&self, source: &mut dyn Read, max_errors: u64) -> Result<UploadTask, Error> {
        let upload_id = self.client.upload_features(&self.id, source, max_errors)?;
        tracing::info!(product = %self.id, upload = %upload_id, "upload accepted");
        Ok(UploadTask::new(self.client.clone(), self.id.clone(), upload_id))
    }

    pub fn upload_file(
        &self,
        path: impl AsRef<Path>,
        max_errors: u64,
    ) -> Result<UploadTask, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            let kind = match err.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                _ => ErrorKind::Io,
            };
            Error::new(kind)
                .with_message(format!("failed to open upload file {}", path.display()))
                .with_source(err)
        })?;
        let mut reader = BufReader::new(file);
        self.upload(&mut reader, max_errors)
    }

    pub fn list_uploads(&self) -> Result<Vec<UploadTask>, Error> {
        Ok(self
            .client
            .get_upload_results(&self.id)?
            .into_iter()
            .map(|info| UploadTask::from_info(self.client.clone(), self.id.clone(), info))
            .collect())
    }

    /// Starts a server-side copy of the current query into a new product.
    ///
    /// Returns immediately; use [`FeatureCollection::wait_for_copy`] on the result to block.
    pub fn copy(&self, spec: &ProductSpec) -> Result<FeatureCollection, Error> {
        spec.validate()?;
        let product = self
            .client
            .create_product_from_query(&self.id, &self.query, spec)?;
        tracing::info!(source = %self.id, target = %product.id, "copy started");
        Ok(Self::from_product(self.client.clone(), product))
    }

    pub fn wait_for_copy(&self, timeout: Option<Duration>) -> Result<(), Error> {
        CopyJob::new(self.client.clone(), self.id.clone())?.wait_for_completion(timeout)
    }

    /// Starts a server-side delete of the features matching the current filters.
    pub fn delete_features(&self) -> Result<DeleteJob, Error> {
        if self.query.query_limit.is_some() {
            return Err(Error::new(ErrorKind::InvalidQuery)
                .with_message("limits cannot be used when deleting features")
                .with_product(self.id.clone()));
        }
        let query = FeatureQuery {
            geometry: self.query.geometry.clone(),
            query_expr: self.query.query_expr.clone(),
            query_limit: None,
        };
        let product_id = self.client.delete_features_from_query(&self.id, &query)?;
        DeleteJob::new(self.client.clone(), product_id)
    }

    fn repr_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::from(self.id.as_str()));
        for (key, value) in [
            ("name", &self.attributes.name),
            ("title", &self.attributes.title),
            ("description", &self.attributes.description),
        ] {
            if !value.is_empty() {
                object.insert(key.to_string(), Value::from(value.as_str()));
            }
        }
        for (key, value) in [
            ("owners", &self.attributes.owners),
            ("readers", &self.attributes.readers),
            ("writers", &self.attributes.writers),
        ] {
            if !value.is_empty() {
                object.insert(key.to_string(), Value::from(value.clone()));
            }
        }
        Value::Object(object)
    }
}

impl fmt::Display for FeatureCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeatureCollection({})", self.repr_json())
    }
}

impl fmt::Debug for FeatureCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureCollection")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

/// Lazy feature stream returned by [`FeatureCollection::features`].
pub struct Features {
    client: Arc<dyn VectorService>,
    product_id: String,
    query: FeatureQuery,
    buffer: VecDeque<Feature>,
    continuation: Option<String>,
    total: u64,
    yielded: u64,
    finished: bool,
}

impl Features {
    /// Size of the full result set (capped by the query limit).
    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    fn limit_reached(&self) -> bool {
        self.query
            .query_limit
            .is_some_and(|limit| self.yielded >= limit)
    }
}

impl Iterator for Features {
    type Item = Result<Feature, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.limit_reached() {
            return None;
        }
        while self.buffer.is_empty() {
            let token = self.continuation.take()?;
            match self
                .client
                .search_features(&self.product_id, &self.query, Some(&token))
            {
                Ok(page) => {
                    self.buffer.extend(page.features);
                    self.continuation = page.continuation;
                    if self.buffer.is_empty() && self.continuation.is_none() {
                        return None;
                    }
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
        let feature = self.buffer.pop_front()?;
        self.yielded += 1;
        Some(Ok(feature))
    }
}

impl fmt::Debug for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Features")
            .field("product_id", &self.product_id)
            .field("total", &self.total)
            .field("yielded", &self.yielded)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{ADD_BATCH_SIZE, FeatureCollection};
    use crate::api::feature::Feature;
    use crate::api::service::{
        FeaturePage, FeatureQuery, JobState, JobStatus, Product, ProductAttributes, ProductSpec,
        ProductUpdate, UploadInfo, UploadResult, UploadStatus,
    };
    use crate::api::testing::{Call, FakeVector};
    use crate::core::error::ErrorKind;
    use crate::core::filter::Property;
    use crate::core::geometry::Geometry;
    use serde_json::{Map, Value, json};
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    fn attributes() -> ProductAttributes {
        ProductAttributes {
            name: "name".to_string(),
            title: "title".to_string(),
            description: "description".to_string(),
            owners: vec!["user:owner".to_string()],
            readers: vec!["group:readers".to_string()],
            writers: Vec::new(),
        }
    }

    fn setup() -> (Arc<FakeVector>, FeatureCollection) {
        let fake = Arc::new(FakeVector::default());
        fake.insert_product(Product::new("foo", attributes()));
        let fc = FeatureCollection::open(fake.clone(), "foo").expect("open");
        (fake, fc)
    }

    fn point_feature(props: Value) -> Feature {
        let properties = match props {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Feature::new(Geometry::point(-105.9, 35.7), properties)
    }

    fn aoi() -> Geometry {
        Geometry::from_value(json!({
            "type": "Polygon",
            "coordinates": [[[-109, 31], [-102, 31], [-102, 37], [-109, 37], [-109, 31]]],
        }))
        .expect("aoi")
    }

    #[test]
    fn open_refreshes_attributes() {
        let (fake, fc) = setup();
        assert_eq!(fc.id(), "foo");
        assert_eq!(fc.title(), "title");
        assert_eq!(fc.owners(), ["user:owner".to_string()]);
        assert_eq!(fake.calls(), vec![Call::GetProduct("foo".to_string())]);
    }

    #[test]
    fn create_validates_then_calls_service() {
        let fake = Arc::new(FakeVector::default());
        let spec = ProductSpec::new("name", "title", "description")
            .with_owners(vec!["user:owners".to_string()])
            .with_readers(vec!["group:readers".to_string()]);

        let fc = FeatureCollection::create(fake.clone(), &spec).expect("create");
        assert_eq!(fc.name(), "name");
        assert_eq!(fake.calls(), vec![Call::CreateProduct(spec)]);

        let bad = ProductSpec::new("name", "title", "description").with_owners(vec!["bob".into()]);
        let err = FeatureCollection::create(fake.clone(), &bad).expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(fake.calls().len(), 1);
    }

    #[test]
    fn filter_geometry_leaves_receiver_untouched() {
        let (fake, fc) = setup();
        let filtered = fc.filter(Some(aoi()), None);

        assert!(fc.query().geometry.is_none());
        assert!(fc.query().query_expr.is_none());
        assert_eq!(filtered.query().geometry, Some(aoi()));

        let collected: Vec<_> = filtered.features().expect("features").collect();
        assert!(collected.is_empty());
        assert_eq!(
            fake.count(|call| matches!(
                call,
                Call::SearchFeatures(
                    id,
                    FeatureQuery { geometry: Some(_), query_expr: None, query_limit: None },
                    None,
                ) if id == "foo"
            )),
            1
        );
    }

    #[test]
    fn later_geometry_replaces_earlier() {
        let (_fake, fc) = setup();
        let first = fc.filter(Some(Geometry::point(0.0, 0.0)), None);
        let second = first.filter(Some(aoi()), None);
        assert_eq!(second.query().geometry, Some(aoi()));
        assert_eq!(first.query().geometry, Some(Geometry::point(0.0, 0.0)));
    }

    #[test]
    fn property_filters_are_anded() {
        let (fake, fc) = setup();
        let exp = Property::new("foo").gt(0);
        let exp2 = Property::new("bar").ge(0);

        let filtered = fc.filter_properties(exp.clone());
        assert_eq!(filtered.query().query_expr, Some(exp.clone()));
        assert!(fc.query().query_expr.is_none());

        let filtered = filtered.filter_properties(exp2.clone());
        assert_eq!(filtered.query().query_expr, Some(exp & exp2));

        assert_eq!(filtered.features().expect("features").count(), 0);
        assert_eq!(fake.count(|call| matches!(call, Call::SearchFeatures(..))), 1);
    }

    #[test]
    fn filter_geometry_accepts_geo_interface() {
        let (_fake, fc) = setup();
        let filtered = fc
            .filter_geometry(&point_feature(json!({})))
            .expect("filter");
        assert_eq!(
            filtered.query().geometry.as_ref().map(Geometry::geometry_type),
            Some("Point")
        );
        let err = fc
            .filter_geometry(&json!({"type": "Feature"}))
            .expect_err("not a geometry");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn limit_is_sent_and_caps_iteration() {
        let (fake, fc) = setup();
        fake.script_pages([Ok(FeaturePage {
            features: (0..5).map(|i| point_feature(json!({"i": i}))).collect(),
            total: Some(50),
            continuation: Some("next".to_string()),
        })]);

        let limited = fc.limit(3);
        let features = limited.features().expect("features");
        assert_eq!(features.len(), 3);
        let items: Vec<_> = features.map(|item| item.expect("feature")).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(
            fake.count(|call| matches!(
                call,
                Call::SearchFeatures(_, FeatureQuery { query_limit: Some(3), .. }, _)
            )),
            1
        );
    }

    #[test]
    fn features_follow_continuation_tokens() {
        let (fake, fc) = setup();
        fake.script_pages([
            Ok(FeaturePage {
                features: vec![point_feature(json!({"i": 0}))],
                total: Some(3),
                continuation: Some("t1".to_string()),
            }),
            Ok(FeaturePage {
                features: vec![point_feature(json!({"i": 1})), point_feature(json!({"i": 2}))],
                total: Some(3),
                continuation: None,
            }),
        ]);

        let features = fc
            .filter_properties(Property::new("i").ge(0))
            .features()
            .expect("features");
        assert_eq!(features.len(), 3);
        let seen: Vec<_> = features
            .map(|item| item.expect("feature").properties["i"].clone())
            .collect();
        assert_eq!(seen, vec![json!(0), json!(1), json!(2)]);
        assert_eq!(
            fake.count(
                |call| matches!(call, Call::SearchFeatures(_, _, Some(token)) if token == "t1")
            ),
            1
        );
    }

    #[test]
    fn page_error_ends_iteration() {
        let (fake, fc) = setup();
        fake.script_pages([
            Ok(FeaturePage {
                features: vec![point_feature(json!({}))],
                total: None,
                continuation: Some("t1".to_string()),
            }),
            Err(ErrorKind::Server),
        ]);
        let mut features = fc.limit(10).features().expect("features");
        assert!(features.next().expect("first").is_ok());
        let err = features.next().expect("second").expect_err("server");
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(features.next().is_none());
    }

    #[test]
    fn list_walks_pages_until_not_found() {
        let fake = Arc::new(FakeVector::default());
        fake.script_product_pages([
            Ok(vec![Product::new("a", attributes()), Product::new("b", attributes())]),
            Ok(vec![Product::new("c", attributes())]),
            Err(ErrorKind::NotFound),
        ]);
        let listed = FeatureCollection::list(fake.clone()).expect("list");
        let ids: Vec<_> = listed.iter().map(FeatureCollection::id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(
            fake.calls(),
            vec![Call::ListProducts(1), Call::ListProducts(2), Call::ListProducts(3)]
        );
    }

    #[test]
    fn list_first_page_error_propagates() {
        let fake = Arc::new(FakeVector::default());
        fake.script_product_pages([Err(ErrorKind::NotFound)]);
        let err = FeatureCollection::list(fake).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn update_merges_returned_attributes() {
        let (fake, mut fc) = setup();
        let update = ProductUpdate {
            title: Some("new title".to_string()),
            description: Some("new description".to_string()),
            ..ProductUpdate::default()
        };
        fc.update(&update).expect("update");
        assert_eq!(fc.title(), "new title");
        assert_eq!(fc.description(), "new description");
        assert_eq!(fc.name(), "name");
        assert_eq!(fc.owners(), ["user:owner".to_string()]);
        assert_eq!(fc.readers(), ["group:readers".to_string()]);
        assert!(fake.calls().contains(&Call::UpdateProduct("foo".to_string(), update)));
    }

    #[test]
    fn update_of_unloaded_proxy_only_sets_returned_fields() {
        let fake = Arc::new(FakeVector::default());
        let mut fc = FeatureCollection::from_product(
            fake.clone(),
            Product::new("foo", ProductAttributes::default()),
        );
        fc.update(&ProductUpdate {
            readers: Some(vec!["org:acme".to_string()]),
            ..ProductUpdate::default()
        })
        .expect("update");
        assert_eq!(fc.readers(), ["org:acme".to_string()]);
        assert_eq!(fc.name(), "");

        fc.refresh().expect("refresh");
        assert_eq!(fc.readers(), ["org:acme".to_string()]);
    }

    #[test]
    fn replace_overwrites_attributes() {
        let (fake, mut fc) = setup();
        let spec = ProductSpec::new("other", "Other", "Replaced").with_writers(Vec::new());
        fc.replace(&spec).expect("replace");
        assert_eq!(fc.name(), "other");
        assert!(fc.owners().is_empty());
        assert!(fake.calls().contains(&Call::ReplaceProduct("foo".to_string(), spec)));
    }

    #[test]
    fn delete_calls_service() {
        let (fake, fc) = setup();
        fc.delete().expect("delete");
        assert!(fake.calls().contains(&Call::DeleteProduct("foo".to_string())));
    }

    #[test]
    fn add_single_sends_geometry_and_properties_only() {
        let (fake, fc) = setup();
        let feature = point_feature(json!({"id": "bar"})).with_id("ignored");
        let added = fc.add(std::slice::from_ref(&feature)).expect("add");

        assert_eq!(added.len(), 1);
        assert_eq!(added[0].id.as_deref(), Some("feature-1"));
        assert_eq!(feature.id.as_deref(), Some("ignored"));
        assert!(fake.calls().contains(&Call::CreateFeatures(
            "foo".to_string(),
            vec![feature.attributes()]
        )));
    }

    #[test]
    fn add_batches_by_hundred() {
        let (fake, fc) = setup();
        let features: Vec<_> = (0..250).map(|i| point_feature(json!({"i": i}))).collect();
        let added = fc.add(&features).expect("add");

        assert_eq!(added.len(), 250);
        assert!(added.iter().all(|feature| feature.id.is_some()));
        assert_eq!(added[249].properties["i"], json!(249));
        let batches: Vec<usize> = fake
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateFeatures(_, batch) => Some(batch.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![ADD_BATCH_SIZE, ADD_BATCH_SIZE, 50]);
    }

    #[test]
    fn display_shows_present_attributes() {
        let fake = Arc::new(FakeVector::default());
        let product = Product::new("foo", ProductAttributes::default());
        let fc = FeatureCollection::from_product(fake, product);
        assert_eq!(fc.to_string(), r#"FeatureCollection({"id":"foo"})"#);
    }

    #[test]
    fn copy_sends_query_and_spec() {
        let (fake, fc) = setup();
        let spec = ProductSpec::new("name", "title", "description")
            .with_owners(vec!["user:owners".to_string()]);
        let filtered = fc
            .filter(Some(aoi()), None)
            .filter_properties(Property::new("foo").gt(0));

        let copied = filtered.copy(&spec).expect("copy");
        assert_ne!(copied.id(), "foo");
        assert_eq!(copied.name(), "name");
        assert!(copied.query().is_unbounded());
        assert_eq!(
            fake.count(|call| matches!(
                call,
                Call::CopyQuery(
                    id,
                    FeatureQuery { geometry: Some(_), query_expr: Some(_), query_limit: None },
                    s,
                ) if id == "foo" && s == &spec
            )),
            1
        );
    }

    #[test]
    fn wait_for_copy_polls_copy_status() {
        let (fake, fc) = setup();
        fake.script_copy([
            JobStatus::new("job", JobState::Running),
            JobStatus::new("job", JobState::Done),
        ]);
        fc.wait_for_copy(None).expect("done");
        assert_eq!(fake.count(|call| matches!(call, Call::CopyStatus(id) if id == "foo")), 2);
    }

    #[test]
    fn wait_for_copy_timeout() {
        let (fake, fc) = setup();
        fake.script_copy(vec![JobStatus::new("job", JobState::Running); 3]);
        let err = fc.wait_for_copy(Some(Duration::ZERO)).expect_err("timeout");
        assert_eq!(err.kind(), ErrorKind::WaitTimeout);
    }

    #[test]
    fn delete_features_sends_filters() {
        let (fake, fc) = setup();
        fake.script_delete([JobStatus::new("foo", JobState::Running)]);
        let exp = Property::new("foo").gt(0);
        let fc = fc.filter(Some(aoi()), Some(exp.clone()));

        let job = fc.delete_features().expect("job");
        assert_eq!(job.product_id(), "foo");
        assert!(fake.calls().contains(&Call::DeleteQuery(
            "foo".to_string(),
            FeatureQuery {
                geometry: Some(aoi()),
                query_expr: Some(exp),
                query_limit: None,
            }
        )));
    }

    #[test]
    fn delete_features_rejects_limit() {
        let (fake, fc) = setup();
        let err = fc.limit(100).delete_features().expect_err("invalid");
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);
        assert_eq!(fake.count(|call| matches!(call, Call::DeleteQuery(..))), 0);
    }

    #[test]
    fn upload_passes_body_and_max_errors() {
        let (fake, fc) = setup();
        let body = b"{\"type\":\"Feature\"}\n".to_vec();
        let task = fc.upload(&mut Cursor::new(body.clone()), 5).expect("upload");
        assert_eq!(task.product_id(), "foo");
        assert!(!task.upload_id().is_empty());
        assert!(fake.calls().contains(&Call::Upload("foo".to_string(), body, 5)));
    }

    #[test]
    fn upload_file_missing_is_not_found() {
        let (_fake, fc) = setup();
        let dir = tempfile::tempdir().expect("tempdir");
        let err = fc
            .upload_file(dir.path().join("missing.ndjson"), 0)
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn list_uploads_wraps_results() {
        let (fake, fc) = setup();
        fake.set_upload_list(vec![UploadInfo {
            id: "up-9".to_string(),
            status: UploadStatus::Success,
            created: None,
            result: UploadResult::default(),
        }]);
        let uploads = fc.list_uploads().expect("uploads");
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].upload_id(), "up-9");
        assert!(uploads[0].is_ready());
    }
}
