//! GraphQL documents sent to the storage `/gql` endpoint.

/// Ensemble names, responses and parameters with their data locations.
pub const GET_REALIZATION: &str = r#"query($ensembleId: ID!) {
  ensemble(id: $ensembleId) {
    name
    responses {
      name
      data_uri
    }
    parameters {
      name
      data_uri
    }
  }
}
"#;

pub const GET_ALL_ENSEMBLES: &str = r#"query {
  experiments {
    id
    name
    ensembles {
      id
      timeCreated
      parentEnsemble {
        id
      }
      childEnsembles {
        id
      }
    }
  }
}
"#;

pub const GET_ENSEMBLE: &str = r#"query ($id: ID!) {
  ensemble(id: $id) {
    id
    size
    activeRealizations
    timeCreated
    children {
      ensembleResult{
        id
      }
    }
    userdata
    parent {
      ensembleReference{
        id
      }
    }
    experiment {
      id
      name
    }
  }
}
"#;

/// Priors arrive as a JSON document encoded in a string field.
pub const GET_PRIORS: &str = r#"query($id: ID!) {
  experiment(id: $id) {
    priors
  }
}
"#;
