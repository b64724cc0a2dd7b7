//! Ensemble and experiment records as returned by the storage GraphQL API.
//!
//! The wire shapes nest references (`parent { ensembleReference { id } }`);
//! the public records flatten them to plain ids.

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Reference to the experiment that owns an ensemble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRef {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Full ensemble record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "EnsembleNode")]
pub struct Ensemble {
    pub id: String,
    pub name: Option<String>,
    pub size: Option<u64>,
    /// Number of realizations that are still active.
    pub active_realizations: usize,
    pub time_created: Option<String>,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub experiment: Option<ExperimentRef>,
    pub userdata: IndexMap<String, Value>,
}

impl Ensemble {
    /// Creation time parsed from `time_created`.
    ///
    /// Accepts RFC 3339 timestamps and naive ISO timestamps, which are taken
    /// as UTC.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.time_created.as_deref().and_then(parse_timestamp)
    }
}

/// Ensemble entry as listed under an experiment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "EnsembleSummaryNode")]
pub struct EnsembleSummary {
    pub id: String,
    pub time_created: Option<String>,
    pub parent: Option<String>,
    pub children: Vec<String>,
}

impl EnsembleSummary {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.time_created.as_deref().and_then(parse_timestamp)
    }
}

/// An experiment and its ensembles in server order.
///
/// Priors are not part of the listing; fetch them with the experiment id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(default, deserialize_with = "optional_id_string")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub ensembles: Vec<EnsembleSummary>,
}

/// Name and data location of a response or parameter record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordRef {
    pub name: String,
    #[serde(default)]
    pub data_uri: Option<String>,
}

/// Responses and parameters attached to an ensemble.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleOutline {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub responses: Vec<RecordRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Vec<RecordRef>,
}

#[derive(Deserialize)]
struct IdNode {
    #[serde(deserialize_with = "id_string")]
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildNode {
    ensemble_result: Option<IdNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParentNode {
    ensemble_reference: Option<IdNode>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActiveRealizations {
    Indices(Vec<i64>),
    Count(usize),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnsembleNode {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    active_realizations: Option<ActiveRealizations>,
    #[serde(default)]
    time_created: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    children: Vec<ChildNode>,
    #[serde(default)]
    parent: Option<ParentNode>,
    #[serde(default)]
    experiment: Option<ExperimentRef>,
    #[serde(default, deserialize_with = "userdata_map")]
    userdata: IndexMap<String, Value>,
}

impl From<EnsembleNode> for Ensemble {
    fn from(node: EnsembleNode) -> Self {
        let active_realizations = match node.active_realizations {
            Some(ActiveRealizations::Indices(indices)) => indices.len(),
            Some(ActiveRealizations::Count(count)) => count,
            None => 0,
        };
        Self {
            id: node.id,
            name: node.name,
            size: node.size,
            active_realizations,
            time_created: node.time_created,
            parent: node.parent.and_then(|parent| parent.ensemble_reference).map(|reference| reference.id),
            children: node
                .children
                .into_iter()
                .filter_map(|child| child.ensemble_result)
                .map(|result| result.id)
                .collect(),
            experiment: node.experiment,
            userdata: node.userdata,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnsembleSummaryNode {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    time_created: Option<String>,
    #[serde(default)]
    parent_ensemble: Option<IdNode>,
    #[serde(default, deserialize_with = "null_as_default")]
    child_ensembles: Vec<IdNode>,
}

impl From<EnsembleSummaryNode> for EnsembleSummary {
    fn from(node: EnsembleSummaryNode) -> Self {
        Self {
            id: node.id,
            time_created: node.time_created,
            parent: node.parent_ensemble.map(|parent| parent.id),
            children: node.child_ensembles.into_iter().map(|child| child.id).collect(),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// GraphQL `ID` values arrive as strings, but some servers send integers.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}

fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(id) => Ok(Some(id)),
        Value::Number(id) => Ok(Some(id.to_string())),
        other => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// User data is a JSON string on some server versions and an object on others.
fn userdata_map<'de, D>(deserializer: D) -> Result<IndexMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(IndexMap::new()),
        Value::String(text) if text.trim().is_empty() => Ok(IndexMap::new()),
        Value::String(text) => serde_json::from_str(&text).map_err(serde::de::Error::custom),
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(serde::de::Error::custom(format!("expected userdata object, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ensemble_flattens_references() {
        let payload = json!({
            "id": "b1c2",
            "size": 5,
            "activeRealizations": [0, 1, 3],
            "timeCreated": "2021-06-01T12:30:00.250000",
            "children": [{"ensembleResult": {"id": "c1"}}, {"ensembleResult": {"id": "c2"}}],
            "userdata": "{\"name\": \"default\", \"iteration\": 0}",
            "parent": {"ensembleReference": {"id": "p0"}},
            "experiment": {"id": "e9", "name": "default"}
        });

        let ensemble: Ensemble = serde_json::from_value(payload).unwrap();

        assert_eq!(ensemble.id, "b1c2");
        assert_eq!(ensemble.size, Some(5));
        assert_eq!(ensemble.active_realizations, 3);
        assert_eq!(ensemble.parent.as_deref(), Some("p0"));
        assert_eq!(ensemble.children, vec!["c1".to_string(), "c2".to_string()]);
        assert_eq!(ensemble.experiment.as_ref().and_then(|e| e.name.as_deref()), Some("default"));
        assert_eq!(ensemble.userdata.get("iteration"), Some(&json!(0)));
        assert_eq!(
            ensemble.userdata.keys().collect::<Vec<_>>(),
            vec!["name", "iteration"],
            "userdata keeps server key order"
        );
        let created = ensemble.created_at().expect("naive timestamps parse as UTC");
        assert_eq!(created.to_rfc3339(), "2021-06-01T12:30:00.250+00:00");
    }

    #[test]
    fn ensemble_tolerates_missing_lineage_and_numeric_ids() {
        let payload = json!({
            "id": 7,
            "activeRealizations": 12,
            "children": null,
            "parent": null,
            "userdata": {"a": 1}
        });

        let ensemble: Ensemble = serde_json::from_value(payload).unwrap();

        assert_eq!(ensemble.id, "7");
        assert_eq!(ensemble.active_realizations, 12);
        assert!(ensemble.parent.is_none());
        assert!(ensemble.children.is_empty());
        assert!(ensemble.created_at().is_none());
    }

    #[test]
    fn experiment_lists_ensemble_summaries() {
        let payload = json!({
            "id": "e1",
            "name": "default",
            "ensembles": [
                {"id": "a", "timeCreated": "2021-06-01T12:00:00+02:00", "parentEnsemble": null, "childEnsembles": [{"id": "b"}]},
                {"id": "b", "parentEnsemble": {"id": "a"}, "childEnsembles": []}
            ]
        });

        let experiment: Experiment = serde_json::from_value(payload).unwrap();

        assert_eq!(experiment.ensembles.len(), 2);
        assert_eq!(experiment.ensembles[0].children, vec!["b".to_string()]);
        assert_eq!(experiment.ensembles[1].parent.as_deref(), Some("a"));
        assert_eq!(
            experiment.ensembles[0].created_at().map(|t| t.to_rfc3339()),
            Some("2021-06-01T10:00:00+00:00".to_string())
        );
    }
}
