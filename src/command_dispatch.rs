//! Purpose: Hold top-level CLI command dispatch for `geovector`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Local inputs (filters, files, specs) are checked before connecting.
//! Invariants: Every successful command emits exactly one JSON document.

use super::*;
use geovector::api::{CopyJob, Product, ProductAttributes};
use output::{feature_json, job_json, product_json, upload_task_json};

pub(super) fn dispatch_command(
    command: Command,
    remote: &RemoteArgs,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "geovector", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::List => {
            let collections = FeatureCollection::list(connect(remote)?)?;
            let products: Vec<_> = collections.iter().map(product_json).collect();
            emit_json(json!({ "products": products }));
            Ok(RunOutcome::ok())
        }
        Command::Info { id } => {
            emit_json(product_json(&open(remote, &id)?));
            Ok(RunOutcome::ok())
        }
        Command::Create { product } => {
            let spec = product.spec();
            spec.validate()?;
            let collection = FeatureCollection::create(connect(remote)?, &spec)?;
            emit_json(product_json(&collection));
            Ok(RunOutcome::ok())
        }
        Command::Update { id, update } => {
            let update = update.update();
            update.validate()?;
            let mut collection = unloaded(connect(remote)?, &id);
            collection.update(&update)?;
            emit_json(product_json(&collection));
            Ok(RunOutcome::ok())
        }
        Command::Replace { id, product } => {
            let spec = product.spec();
            spec.validate()?;
            let mut collection = unloaded(connect(remote)?, &id);
            collection.replace(&spec)?;
            emit_json(product_json(&collection));
            Ok(RunOutcome::ok())
        }
        Command::Delete { id } => {
            unloaded(connect(remote)?, &id).delete()?;
            emit_json(json!({ "deleted": id }));
            Ok(RunOutcome::ok())
        }
        Command::Search { id, filter, limit } => {
            let (geometry, expression) = filter.parse()?;
            let mut query = unloaded(connect(remote)?, &id).filter(geometry, expression);
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            let features = query.features()?;
            let total = features.len();
            let features = features
                .map(|item| item.map(|feature| feature_json(&feature)))
                .collect::<Result<Vec<_>, Error>>()?;
            emit_json(json!({
                "product": id,
                "total": total,
                "features": features,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Add { id, file } => {
            let features = read_features(&file)?;
            let added = unloaded(connect(remote)?, &id).add(&features)?;
            let ids: Vec<_> = added.iter().map(|feature| feature.id.clone()).collect();
            emit_json(json!({ "product": id, "added": ids }));
            Ok(RunOutcome::ok())
        }
        Command::Upload {
            id,
            file,
            max_errors,
            wait,
        } => {
            let mut task = unloaded(connect(remote)?, &id).upload_file(&file, max_errors)?;
            if wait.wait {
                task.get_result(true, wait.timeout())?;
            }
            emit_json(upload_task_json(&task));
            Ok(RunOutcome::ok())
        }
        Command::Uploads { id } => {
            let tasks = unloaded(connect(remote)?, &id).list_uploads()?;
            let uploads: Vec<_> = tasks.iter().map(upload_task_json).collect();
            emit_json(json!({ "product": id, "uploads": uploads }));
            Ok(RunOutcome::ok())
        }
        Command::Copy {
            id,
            filter,
            limit,
            product,
            wait,
        } => {
            let (geometry, expression) = filter.parse()?;
            let spec = product.spec();
            spec.validate()?;
            let mut query = unloaded(connect(remote)?, &id).filter(geometry, expression);
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            let copied = query.copy(&spec)?;
            let mut value = product_json(&copied);
            if wait.wait {
                let mut job = CopyJob::new(copied.client().clone(), copied.id())?;
                job.wait_for_completion(wait.timeout())?;
                value["copy"] = job_json(copied.id(), job.status());
            }
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::WaitCopy { id, timeout } => {
            let mut job = CopyJob::new(connect(remote)?, id.as_str())?;
            job.wait_for_completion(timeout.map(Duration::from_secs))?;
            emit_json(job_json(&id, job.status()));
            Ok(RunOutcome::ok())
        }
        Command::DeleteFeatures { id, filter, wait } => {
            let (geometry, expression) = filter.parse()?;
            let query = unloaded(connect(remote)?, &id).filter(geometry, expression);
            let mut job = query.delete_features()?;
            if wait.wait {
                job.wait_for_completion(wait.timeout())?;
            }
            emit_json(job_json(&id, job.status()));
            Ok(RunOutcome::ok())
        }
    }
}

/// Collection handle for commands that never read the product's attributes.
fn unloaded(client: Arc<dyn VectorService>, id: &str) -> FeatureCollection {
    FeatureCollection::from_product(client, Product::new(id, ProductAttributes::default()))
}
