//! Connection-scoped storage client.
//!
//! A [`DataLoader`] talks to one storage server with one token. Its
//! operations never fail: every transport, query or decode error is logged
//! once at error level and replaced by the empty value of the operation's
//! return type (an empty `Vec`, an empty map, [`Frame::empty`] or `None`).
//! An empty result therefore means "no data, or the fetch failed".

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use ertdata_api::{HttpTransport, RawResponse, encode_path_segment, http_get, queries, run_query};
use ertdata_types::{ConnectionKey, Ensemble, EnsembleOutline, Experiment, Frame};
use lru::LruCache;
use serde_json::{Map, Value, json};
use tracing::{debug, error};

use crate::decode::{self, unexpected};
use crate::{DecodeError, LoaderError};

/// `accept` value asking the server for parquet instead of JSON.
pub const PARQUET_MIME: &str = "application/x-parquet";
/// `accept` value for misfit tables.
pub const CSV_MIME: &str = "text/csv";

type QueryCache = Mutex<LruCache<(String, String), Value>>;

pub struct DataLoader {
    key: ConnectionKey,
    transport: Arc<dyn HttpTransport>,
    query_cache: Option<QueryCache>,
}

impl fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("key", &self.key)
            .field("query_cache", &self.query_cache.is_some())
            .finish()
    }
}

impl DataLoader {
    /// Create a client for `key`. A `query_cache_capacity` of zero disables
    /// GraphQL response caching.
    ///
    /// Clients are normally obtained through [`crate::ClientRegistry`], which
    /// guarantees one instance per key.
    pub fn new(key: ConnectionKey, transport: Arc<dyn HttpTransport>, query_cache_capacity: usize) -> Self {
        let query_cache = NonZeroUsize::new(query_cache_capacity).map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self {
            key,
            transport,
            query_cache,
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Every ensemble of every experiment, flattened, each carrying its
    /// experiment's `name`. Ensemble fields win over the experiment name.
    pub async fn list_all_ensembles(&self) -> Vec<Map<String, Value>> {
        let result = self.try_list_all_ensembles().await;
        self.degrade("list_all_ensembles", "all", result)
    }

    async fn try_list_all_ensembles(&self) -> Result<Vec<Map<String, Value>>, LoaderError> {
        let data = self.query(queries::GET_ALL_ENSEMBLES, json!({})).await?;
        let mut flattened = Vec::new();
        for experiment in expect_array(take_field(data, "experiments")?, "an array of experiments")? {
            let Value::Object(mut experiment) = experiment else {
                return Err(unexpected("an experiment object", &experiment).into());
            };
            let name = experiment.remove("name").unwrap_or(Value::Null);
            let ensembles = match experiment.remove("ensembles") {
                None | Some(Value::Null) => Vec::new(),
                Some(ensembles) => expect_array(ensembles, "an array of ensembles")?,
            };
            for ensemble in ensembles {
                let Value::Object(fields) = ensemble else {
                    return Err(unexpected("an ensemble object", &ensemble).into());
                };
                let mut entry = Map::new();
                entry.insert("name".to_string(), name.clone());
                entry.extend(fields);
                flattened.push(entry);
            }
        }
        Ok(flattened)
    }

    /// Experiments with their ensemble summaries.
    pub async fn list_experiments(&self) -> Vec<Experiment> {
        let result: Result<_, LoaderError> = async {
            let data = self.query(queries::GET_ALL_ENSEMBLES, json!({})).await?;
            Ok(serde_json::from_value(take_field(data, "experiments")?)?)
        }
        .await;
        self.degrade("list_experiments", "all", result)
    }

    pub async fn get_ensemble(&self, ensemble_id: &str) -> Option<Ensemble> {
        let result: Result<_, LoaderError> = async {
            let data = self.query(queries::GET_ENSEMBLE, json!({ "id": ensemble_id })).await?;
            Ok(Some(serde_json::from_value(take_field(data, "ensemble")?)?))
        }
        .await;
        self.degrade("get_ensemble", ensemble_id, result)
    }

    /// Names and data locations of the ensemble's responses and parameters.
    pub async fn get_ensemble_outline(&self, ensemble_id: &str) -> Option<EnsembleOutline> {
        let result: Result<_, LoaderError> = async {
            let data = self
                .query(queries::GET_REALIZATION, json!({ "ensembleId": ensemble_id }))
                .await?;
            Ok(Some(serde_json::from_value(take_field(data, "ensemble")?)?))
        }
        .await;
        self.degrade("get_ensemble_outline", ensemble_id, result)
    }

    pub async fn get_ensemble_responses(&self, ensemble_id: &str) -> Map<String, Value> {
        let result: Result<_, LoaderError> = async {
            let response = self.get(&ensemble_path(ensemble_id, "responses"), &[], &[]).await?;
            Ok(decode::json_object(&response.body)?)
        }
        .await;
        self.degrade("get_ensemble_responses", ensemble_id, result)
    }

    pub async fn get_ensemble_userdata(&self, ensemble_id: &str) -> Map<String, Value> {
        let result: Result<_, LoaderError> = async {
            let response = self.get(&ensemble_path(ensemble_id, "userdata"), &[], &[]).await?;
            Ok(decode::json_object(&response.body)?)
        }
        .await;
        self.degrade("get_ensemble_userdata", ensemble_id, result)
    }

    pub async fn get_ensemble_parameters(&self, ensemble_id: &str) -> Vec<Value> {
        let result: Result<_, LoaderError> = async {
            let response = self.get(&ensemble_path(ensemble_id, "parameters"), &[], &[]).await?;
            Ok(decode::json_array(&response.body)?)
        }
        .await;
        self.degrade("get_ensemble_parameters", ensemble_id, result)
    }

    pub async fn get_record_labels(&self, ensemble_id: &str, name: &str) -> Vec<Value> {
        let result: Result<_, LoaderError> = async {
            let path = format!("{}/labels", record_path(ensemble_id, name));
            let response = self.get(&path, &[], &[]).await?;
            Ok(decode::json_array(&response.body)?)
        }
        .await;
        self.degrade("get_record_labels", &target(ensemble_id, name), result)
    }

    /// The experiment's prior specification, decoded from its JSON string.
    pub async fn get_experiment_priors(&self, experiment_id: &str) -> Map<String, Value> {
        let result: Result<_, LoaderError> = async {
            let data = self.query(queries::GET_PRIORS, json!({ "id": experiment_id })).await?;
            let priors = take_field(take_field(data, "experiment")?, "priors")?;
            match priors {
                Value::String(document) => Ok(decode::json_object(document.as_bytes())?),
                Value::Object(map) => Ok(map),
                other => Err(unexpected("a priors document", &other).into()),
            }
        }
        .await;
        self.degrade("get_experiment_priors", experiment_id, result)
    }

    /// Parameter values, one row per realization.
    ///
    /// A name of the form `NAME::LABEL` fetches record `NAME` restricted to
    /// `LABEL`.
    pub async fn get_parameter_data(&self, ensemble_id: &str, parameter_name: &str) -> Frame {
        let result: Result<_, LoaderError> = async {
            let (name, query) = match parameter_name.split_once("::") {
                Some((name, label)) => (name, vec![("label".to_string(), label.to_string())]),
                None => (parameter_name, Vec::new()),
            };
            let response = self
                .get(&record_path(ensemble_id, name), &[("accept", PARQUET_MIME)], &query)
                .await?;
            Ok(decode::parquet_frame(response.body)?.transpose())
        }
        .await;
        self.degrade("get_parameter_data", &target(ensemble_id, parameter_name), result)
    }

    /// Record values, one row per realization.
    ///
    /// Realization labels are turned into integers and the rows sorted when
    /// every label is numeric; otherwise the server's order is kept.
    pub async fn get_record_data(&self, ensemble_id: &str, record_name: &str) -> Frame {
        let result: Result<_, LoaderError> = async {
            let response = self
                .get(&record_path(ensemble_id, record_name), &[("accept", PARQUET_MIME)], &[])
                .await?;
            let mut frame = decode::parquet_frame(response.body)?.transpose();
            if frame.coerce_index_to_int() {
                frame.sort_by_index();
            } else {
                debug!(ensemble_id, record_name, "record index is not numeric; keeping server order");
            }
            Ok(frame)
        }
        .await;
        self.degrade("get_record_data", &target(ensemble_id, record_name), result)
    }

    /// Observations attached to a record.
    ///
    /// All realizations share their observations, so realization 0 is asked.
    pub async fn get_record_observations(&self, ensemble_id: &str, record_name: &str) -> Vec<Map<String, Value>> {
        let result: Result<_, LoaderError> = async {
            let path = format!("{}/observations", record_path(ensemble_id, record_name));
            let query = [("realization_index".to_string(), "0".to_string())];
            let response = self.get(&path, &[], &query).await?;
            Ok(decode::json_object_array(&response.body)?)
        }
        .await;
        self.degrade("get_record_observations", &target(ensemble_id, record_name), result)
    }

    /// Misfit table computed by the server, in the server's orientation.
    ///
    /// Numeric cells are kept as the literals the server sent. Results are
    /// not cached.
    pub async fn compute_misfit(&self, ensemble_id: &str, response_name: &str, summary: bool) -> Frame {
        let result: Result<_, LoaderError> = async {
            let query = [
                ("ensemble_id".to_string(), ensemble_id.to_string()),
                ("response_name".to_string(), response_name.to_string()),
                ("summary_misfits".to_string(), if summary { "True" } else { "False" }.to_string()),
            ];
            let response = self.get("compute/misfits", &[("accept", CSV_MIME)], &query).await?;
            Ok(decode::csv_frame(&response.body)?)
        }
        .await;
        self.degrade("compute_misfit", &target(ensemble_id, response_name), result)
    }

    async fn query(&self, query: &str, variables: Value) -> Result<Value, LoaderError> {
        let cache_key = (query.to_string(), variables.to_string());
        if let Some(cache) = &self.query_cache {
            let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(data) = cache.get(&cache_key) {
                debug!(base_url = %self.key.base_url(), "query cache hit");
                return Ok(data.clone());
            }
        }

        let data = run_query(self.transport.as_ref(), &self.key, query, variables).await?;

        if let Some(cache) = &self.query_cache {
            cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .put(cache_key, data.clone());
        }
        Ok(data)
    }

    async fn get(
        &self,
        path: &str,
        headers: &[(&str, &str)],
        query: &[(String, String)],
    ) -> Result<RawResponse, LoaderError> {
        Ok(http_get(self.transport.as_ref(), &self.key, path, headers, query).await?)
    }

    /// The single place where errors turn into empty results.
    fn degrade<T: Default>(&self, operation: &'static str, target: &str, result: Result<T, LoaderError>) -> T {
        result.unwrap_or_else(|failure| {
            error!(
                operation,
                target,
                base_url = %self.key.base_url(),
                error = %failure,
                "storage operation failed, returning empty result"
            );
            T::default()
        })
    }
}

fn ensemble_path(ensemble_id: &str, leaf: &str) -> String {
    format!("ensembles/{}/{leaf}", encode_path_segment(ensemble_id))
}

fn record_path(ensemble_id: &str, record_name: &str) -> String {
    format!(
        "ensembles/{}/records/{}",
        encode_path_segment(ensemble_id),
        encode_path_segment(record_name)
    )
}

fn target(ensemble_id: &str, name: &str) -> String {
    format!("{ensemble_id}/{name}")
}

fn take_field(value: Value, field: &'static str) -> Result<Value, DecodeError> {
    match value {
        Value::Object(mut map) => match map.remove(field) {
            None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
            Some(found) => Ok(found),
        },
        other => Err(unexpected("a JSON object", &other)),
    }
}

fn expect_array(value: Value, expected: &'static str) -> Result<Vec<Value>, DecodeError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(unexpected(expected, &other)),
    }
}
