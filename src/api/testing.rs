// In-memory `VectorService` used by unit tests; records every call and replays scripted replies.
use super::feature::{Feature, FeatureAttributes};
use super::service::{
    FeaturePage, FeatureQuery, JobStatus, Product, ProductAttributes, ProductPatch, ProductSpec,
    ProductUpdate, UploadInfo, VectorService,
};
use crate::core::error::{Error, ErrorKind};
use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    ListProducts(u32),
    CreateProduct(ProductSpec),
    GetProduct(String),
    UpdateProduct(String, ProductUpdate),
    ReplaceProduct(String, ProductSpec),
    DeleteProduct(String),
    CreateFeatures(String, Vec<FeatureAttributes>),
    SearchFeatures(String, FeatureQuery, Option<String>),
    CopyQuery(String, FeatureQuery, ProductSpec),
    CopyStatus(String),
    DeleteQuery(String, FeatureQuery),
    DeleteStatus(String),
    Upload(String, Vec<u8>, u64),
    UploadResults(String),
    UploadResult(String, String),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    products: HashMap<String, Product>,
    product_pages: VecDeque<Result<Vec<Product>, ErrorKind>>,
    feature_pages: VecDeque<Result<FeaturePage, ErrorKind>>,
    copy_statuses: VecDeque<JobStatus>,
    delete_statuses: VecDeque<JobStatus>,
    upload_results: VecDeque<Result<UploadInfo, ErrorKind>>,
    upload_list: Vec<UploadInfo>,
    next_id: u64,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

#[derive(Default)]
pub(crate) struct FakeVector {
    state: Mutex<FakeState>,
}

impl FakeVector {
    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().expect("fake state lock");
        f(&mut state)
    }

    pub(crate) fn insert_product(&self, product: Product) {
        self.with_state(|state| {
            state.products.insert(product.id.clone(), product);
        });
    }

    pub(crate) fn script_product_pages(
        &self,
        pages: impl IntoIterator<Item = Result<Vec<Product>, ErrorKind>>,
    ) {
        self.with_state(|state| state.product_pages.extend(pages));
    }

    pub(crate) fn script_pages(
        &self,
        pages: impl IntoIterator<Item = Result<FeaturePage, ErrorKind>>,
    ) {
        self.with_state(|state| state.feature_pages.extend(pages));
    }

    pub(crate) fn script_copy(&self, statuses: impl IntoIterator<Item = JobStatus>) {
        self.with_state(|state| state.copy_statuses.extend(statuses));
    }

    pub(crate) fn script_delete(&self, statuses: impl IntoIterator<Item = JobStatus>) {
        self.with_state(|state| state.delete_statuses.extend(statuses));
    }

    pub(crate) fn script_uploads(
        &self,
        results: impl IntoIterator<Item = Result<UploadInfo, ErrorKind>>,
    ) {
        self.with_state(|state| state.upload_results.extend(results));
    }

    pub(crate) fn set_upload_list(&self, uploads: Vec<UploadInfo>) {
        self.with_state(|state| state.upload_list = uploads);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.with_state(|state| state.calls.clone())
    }

    pub(crate) fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.with_state(|state| state.calls.iter().filter(|call| predicate(call)).count())
    }

    fn record(&self, call: Call) {
        self.with_state(|state| state.calls.push(call));
    }
}

fn scripted_error(kind: ErrorKind) -> Error {
    Error::new(kind).with_message("scripted failure")
}

fn product_from_spec(id: String, spec: &ProductSpec) -> Product {
    Product::new(
        id,
        ProductAttributes {
            name: spec.name.clone(),
            title: spec.title.clone(),
            description: spec.description.clone(),
            owners: spec.owners.clone().unwrap_or_default(),
            readers: spec.readers.clone().unwrap_or_default(),
            writers: spec.writers.clone().unwrap_or_default(),
        },
    )
}

impl VectorService for FakeVector {
    fn list_products(&self, page: u32) -> Result<Vec<Product>, Error> {
        self.record(Call::ListProducts(page));
        self.with_state(|state| match state.product_pages.pop_front() {
            Some(Ok(products)) => Ok(products),
            Some(Err(kind)) => Err(scripted_error(kind)),
            None => Ok(Vec::new()),
        })
    }

    fn create_product(&self, spec: &ProductSpec) -> Result<Product, Error> {
        self.record(Call::CreateProduct(spec.clone()));
        self.with_state(|state| {
            let product = product_from_spec(state.next_id("product"), spec);
            state.products.insert(product.id.clone(), product.clone());
            Ok(product)
        })
    }

    fn get_product(&self, product_id: &str) -> Result<ProductPatch, Error> {
        self.record(Call::GetProduct(product_id.to_string()));
        self.with_state(|state| {
            state
                .products
                .get(product_id)
                .map(|product| ProductPatch::from(product.attributes.clone()))
                .ok_or_else(|| scripted_error(ErrorKind::NotFound))
        })
    }

    /// Stores the merged record but answers with only the updated fields.
    fn update_product(
        &self,
        product_id: &str,
        update: &ProductUpdate,
    ) -> Result<ProductPatch, Error> {
        self.record(Call::UpdateProduct(product_id.to_string(), update.clone()));
        let patch = ProductPatch {
            name: update.name.clone(),
            title: update.title.clone(),
            description: update.description.clone(),
            owners: update.owners.clone(),
            readers: update.readers.clone(),
            writers: update.writers.clone(),
        };
        self.with_state(|state| {
            state
                .products
                .entry(product_id.to_string())
                .or_insert_with(|| Product::new(product_id, ProductAttributes::default()))
                .attributes
                .merge(patch.clone());
        });
        Ok(patch)
    }

    fn replace_product(
        &self,
        product_id: &str,
        spec: &ProductSpec,
    ) -> Result<ProductPatch, Error> {
        self.record(Call::ReplaceProduct(product_id.to_string(), spec.clone()));
        self.with_state(|state| {
            let product = product_from_spec(product_id.to_string(), spec);
            state.products.insert(product.id.clone(), product.clone());
            Ok(ProductPatch::from(product.attributes))
        })
    }

    fn delete_product(&self, product_id: &str) -> Result<(), Error> {
        self.record(Call::DeleteProduct(product_id.to_string()));
        self.with_state(|state| {
            state.products.remove(product_id);
        });
        Ok(())
    }

    fn create_features(
        &self,
        product_id: &str,
        features: &[FeatureAttributes],
    ) -> Result<Vec<Feature>, Error> {
        self.record(Call::CreateFeatures(product_id.to_string(), features.to_vec()));
        self.with_state(|state| {
            Ok(features
                .iter()
                .map(|attributes| Feature {
                    id: Some(state.next_id("feature")),
                    geometry: attributes.geometry.clone(),
                    properties: attributes.properties.clone(),
                })
                .collect())
        })
    }

    fn search_features(
        &self,
        product_id: &str,
        query: &FeatureQuery,
        continuation: Option<&str>,
    ) -> Result<FeaturePage, Error> {
        self.record(Call::SearchFeatures(
            product_id.to_string(),
            query.clone(),
            continuation.map(str::to_string),
        ));
        self.with_state(|state| match state.feature_pages.pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(kind)) => Err(scripted_error(kind)),
            None => Ok(FeaturePage::default()),
        })
    }

    fn create_product_from_query(
        &self,
        product_id: &str,
        query: &FeatureQuery,
        spec: &ProductSpec,
    ) -> Result<Product, Error> {
        self.record(Call::CopyQuery(
            product_id.to_string(),
            query.clone(),
            spec.clone(),
        ));
        self.with_state(|state| {
            let product = product_from_spec(state.next_id("copy"), spec);
            state.products.insert(product.id.clone(), product.clone());
            Ok(product)
        })
    }

    fn get_product_from_query_status(&self, product_id: &str) -> Result<JobStatus, Error> {
        self.record(Call::CopyStatus(product_id.to_string()));
        self.with_state(|state| {
            state
                .copy_statuses
                .pop_front()
                .ok_or_else(|| scripted_error(ErrorKind::NotFound))
        })
    }

    fn delete_features_from_query(
        &self,
        product_id: &str,
        query: &FeatureQuery,
    ) -> Result<String, Error> {
        self.record(Call::DeleteQuery(product_id.to_string(), query.clone()));
        Ok(product_id.to_string())
    }

    fn get_delete_features_status(&self, product_id: &str) -> Result<JobStatus, Error> {
        self.record(Call::DeleteStatus(product_id.to_string()));
        self.with_state(|state| {
            state
                .delete_statuses
                .pop_front()
                .ok_or_else(|| scripted_error(ErrorKind::NotFound))
        })
    }

    fn upload_features(
        &self,
        product_id: &str,
        source: &mut dyn Read,
        max_errors: u64,
    ) -> Result<String, Error> {
        let mut body = Vec::new();
        source
            .read_to_end(&mut body)
            .map_err(|err| Error::new(ErrorKind::Io).with_source(err))?;
        self.record(Call::Upload(product_id.to_string(), body, max_errors));
        Ok(self.with_state(|state| state.next_id("upload")))
    }

    fn get_upload_results(&self, product_id: &str) -> Result<Vec<UploadInfo>, Error> {
        self.record(Call::UploadResults(product_id.to_string()));
        Ok(self.with_state(|state| state.upload_list.clone()))
    }

    fn get_upload_result(&self, product_id: &str, upload_id: &str) -> Result<UploadInfo, Error> {
        self.record(Call::UploadResult(
            product_id.to_string(),
            upload_id.to_string(),
        ));
        self.with_state(|state| match state.upload_results.pop_front() {
            Some(Ok(info)) => Ok(info),
            Some(Err(kind)) => Err(scripted_error(kind)),
            None => Err(scripted_error(ErrorKind::NotFound)),
        })
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(1)
    }
}
