#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("MODEL_MAP_JSON must be valid JSON: {0}")]
    ModelMapParseError(#[from] serde_json::Error),
    #[error("MODEL_MAP_JSON must be a JSON object")]
    ModelMapNotAnObject,
    #[error("MODEL_MAP_JSON['models'] must be a JSON object")]
    ModelMapNestedNotAnObject,
    #[error("MODEL_MAP_JSON cannot contain both top-level mappings and a 'models' object")]
    ModelMapMixedShape,
    #[error("MODEL_MAP_JSON keys must be non-empty strings")]
    ModelMapEmptyKey,
    #[error("MODEL_MAP_JSON value for '{0}' must be a non-empty string")]
    ModelMapInvalidValue(String),
    #[error("MODEL_MAP_JSON has duplicate keys after normalization: {0}")]
    ModelMapDuplicateKey(String),
}
