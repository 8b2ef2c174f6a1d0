//! Index preparation on the target before documents are streamed.
//!
//! Resolves the source index list, rebuilds each index body from the source
//! mappings and settings, and creates it on the target with replication off.
//! [`restore_replicas`] turns replication back on once loading is done.

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::cluster::{ClusterApi, IndexMap};
use crate::config::MigrationOptions;
use crate::error::{Error, Result};

/// Settings that identify one physical index and must not be copied.
const VOLATILE_SETTINGS: [&str; 4] = ["creation_date", "uuid", "version", "provided_name"];

/// Replica count used when the source value is unknown.
const DEFAULT_REPLICAS: &str = "1";

/// What was done to the target, and what the pipeline should read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPlan {
    /// Source indices to stream, comma-joined.
    pub stream_pattern: String,
    /// Target indices created by this run.
    pub created: Vec<String>,
    /// Replica counts to restore on created indices after loading.
    pub replicas: Vec<(String, String)>,
}

/// Compiles a comma-separated list of glob patterns into one anchored regex.
///
/// `*` matches any run of characters and `?` a single one; everything else is
/// literal. `_all` matches every name.
///
/// # Errors
///
/// Returns [`Error::Config`] if the resulting expression does not compile.
pub fn glob_regex(pattern: &str) -> Result<Regex> {
    let alternatives: Vec<String> = pattern
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            if p == "_all" {
                return ".*".to_string();
            }
            let mut re = String::with_capacity(p.len() + 8);
            for c in p.chars() {
                match c {
                    '*' => re.push_str(".*"),
                    '?' => re.push('.'),
                    c => re.push_str(&regex::escape(&c.to_string())),
                }
            }
            re
        })
        .collect();
    Regex::new(&format!("^(?:{})$", alternatives.join("|")))
        .map_err(|e| Error::Config(format!("invalid index pattern '{}': {}", pattern, e)))
}

/// True for internal indices (`.kibana`, `_river`...), skipped unless asked for.
fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Reads source mappings for `pattern` and returns the matching index names
/// (sorted) with their mapping bodies.
///
/// # Errors
///
/// Cluster errors, or [`Error::Config`] if nothing matches.
pub async fn resolve_indices(
    source: &dyn ClusterApi,
    pattern: &str,
    copy_all: bool,
) -> Result<(Vec<String>, IndexMap)> {
    let matcher = glob_regex(pattern)?;
    let mut mappings = source.read_mappings(pattern).await?;
    mappings.retain(|name, _| (copy_all || !is_hidden(name)) && matcher.is_match(name));

    let mut names: Vec<String> = mappings.keys().cloned().collect();
    names.sort();
    if names.is_empty() {
        return Err(Error::Config(format!(
            "no source index matches '{}'",
            pattern
        )));
    }
    debug!(?names, "resolved source indices");
    Ok((names, mappings))
}

/// Mapping types of one entry. Very old clusters return them without the
/// `mappings` wrapper.
fn mapping_types(entry: Value) -> Value {
    match entry {
        Value::Object(mut map) if map.contains_key("mappings") => {
            map.remove("mappings").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Extracts the `index` settings object of one settings entry.
///
/// Accepts both `{"settings": {"index": {...}}}` and the flat
/// `{"settings": {"index.number_of_shards": ...}}` form.
fn index_settings(entry: &Value) -> Map<String, Value> {
    let Some(settings) = entry.get("settings").and_then(Value::as_object) else {
        return Map::new();
    };
    if let Some(Value::Object(index)) = settings.get("index") {
        return index.clone();
    }
    settings
        .iter()
        .filter_map(|(k, v)| k.strip_prefix("index.").map(|k| (k.to_string(), v.clone())))
        .collect()
}

/// Builds target index bodies from source metadata.
pub struct IndexPreparer<'a> {
    source: &'a dyn ClusterApi,
    target: &'a dyn ClusterApi,
    options: &'a MigrationOptions,
}

impl<'a> IndexPreparer<'a> {
    /// Creates a preparer copying from `source` to `target`.
    pub fn new(
        source: &'a dyn ClusterApi,
        target: &'a dyn ClusterApi,
        options: &'a MigrationOptions,
    ) -> Self {
        Self {
            source,
            target,
            options,
        }
    }

    /// True if any option asks for index preparation.
    #[must_use]
    pub fn is_requested(options: &MigrationOptions) -> bool {
        options.copy_settings || options.copy_mappings || options.force
    }

    /// Resolves, rebuilds and creates the target indices.
    ///
    /// # Errors
    ///
    /// Cluster errors while reading metadata, deleting or creating indices.
    /// Without `force`, an index that already exists is kept and skipped.
    pub async fn prepare(&self) -> Result<IndexPlan> {
        let (names, mappings) =
            resolve_indices(self.source, &self.options.indices, self.options.copy_all_indices)
                .await?;
        let settings = if self.options.copy_settings {
            self.source.read_settings(&names.join(",")).await?
        } else {
            IndexMap::new()
        };

        let targets: Vec<(String, &String)> = match &self.options.target_index {
            Some(target) => vec![(target.clone(), &names[0])],
            None => names.iter().map(|n| (n.clone(), n)).collect(),
        };

        let mut plan = IndexPlan {
            stream_pattern: names.join(","),
            ..IndexPlan::default()
        };
        for (target_name, source_name) in targets {
            let (body, replicas) = self.build_body(
                mappings.get(source_name.as_str()).cloned(),
                settings.get(source_name.as_str()),
            );
            if self.create(&target_name, &body).await? {
                plan.created.push(target_name.clone());
                plan.replicas.push((target_name, replicas));
            }
        }
        info!(
            indices = names.len(),
            created = plan.created.len(),
            "target indices prepared"
        );
        Ok(plan)
    }

    /// Returns the create body and the replica count to restore later.
    fn build_body(&self, mapping: Option<Value>, settings: Option<&Value>) -> (Value, String) {
        let mut index = settings.map(index_settings).unwrap_or_default();
        for key in VOLATILE_SETTINGS {
            index.remove(key);
        }
        let replicas = match index.get("number_of_replicas") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => DEFAULT_REPLICAS.to_string(),
        };
        if let Some(shards) = self.options.shards {
            index.insert("number_of_shards".to_string(), json!(shards.to_string()));
        }
        index.insert("number_of_replicas".to_string(), json!("0"));

        let mut body = json!({"settings": {"index": index}});
        if self.options.copy_mappings {
            if let Some(mapping) = mapping.map(mapping_types) {
                body["mappings"] = mapping;
            }
        }
        (body, replicas)
    }

    /// Creates one index; `Ok(false)` if it already existed and was kept.
    async fn create(&self, name: &str, body: &Value) -> Result<bool> {
        if self.options.force {
            self.target.delete_index(name).await?;
            info!(index = name, "deleted target index");
        }
        match self.target.create_index(name, body).await {
            Ok(()) => {
                info!(index = name, "created target index");
                Ok(true)
            }
            Err(Error::Protocol { status: 400, body: reason }) if is_already_exists(&reason) => {
                warn!(index = name, "target index already exists, keeping it");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

fn is_already_exists(body: &str) -> bool {
    body.contains("already_exists") || body.contains("IndexAlreadyExists")
}

/// Resolves the index list and prepares the target; see [`IndexPreparer`].
///
/// # Errors
///
/// See [`IndexPreparer::prepare`].
pub async fn prepare_indices(
    source: &dyn ClusterApi,
    target: &dyn ClusterApi,
    options: &MigrationOptions,
) -> Result<IndexPlan> {
    IndexPreparer::new(source, target, options).prepare().await
}

/// Restores replica counts on every index the plan created.
///
/// # Errors
///
/// The first failing settings update.
pub async fn restore_replicas(target: &dyn ClusterApi, plan: &IndexPlan) -> Result<()> {
    for (name, replicas) in &plan.replicas {
        target
            .update_settings(name, &json!({"index": {"number_of_replicas": replicas}}))
            .await?;
        info!(index = %name, replicas = %replicas, "replication restored");
    }
    Ok(())
}
