//! Session Credential Bundle
//!
//! `AuthState` is the opaque credential set (identity keys, session keys,
//! device metadata) that lets a session resume without re-pairing.
//!
//! The protocol client owns its contents; this crate only checks for a bound
//! identity and moves the bundle between the connection and durable storage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which the protocol client records the bound identity.
///
/// Present only once a device has been paired; its absence means the
/// connection must go through the QR handshake.
pub const IDENTITY_KEY: &str = "me";

/// Opaque, JSON-serializable credential bundle
///
/// Either fully absent (modelled as `Option<AuthState>` by callers) or fully
/// valid. Construction from JSON is all-or-nothing: a value that is not a JSON
/// object is rejected and never yields a half-initialized state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthState {
    attrs: Map<String, Value>,
}

/// Errors building an `AuthState` from JSON
#[derive(Debug, thiserror::Error)]
pub enum AuthStateError {
    #[error("auth state must be a JSON object, found {0}")]
    NotAnObject(&'static str),
}

impl AuthState {
    /// Create an empty (unpaired) state
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from a parsed JSON document
    pub fn from_json(value: Value) -> Result<Self, AuthStateError> {
        match value {
            Value::Object(attrs) => Ok(Self { attrs }),
            other => Err(AuthStateError::NotAnObject(json_kind(&other))),
        }
    }

    /// Replace the contents of this state with `value`
    ///
    /// On error `self` is left untouched.
    pub fn populate_from_json(&mut self, value: Value) -> Result<(), AuthStateError> {
        *self = Self::from_json(value)?;
        Ok(())
    }

    /// Serialize to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.attrs.clone())
    }

    /// Whether `key` is present with a non-null value
    pub fn has(&self, key: &str) -> bool {
        self.attrs.get(key).is_some_and(|v| !v.is_null())
    }

    /// Whether a device identity is bound (a paired session)
    pub fn is_identified(&self) -> bool {
        self.has(IDENTITY_KEY)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.attrs.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_from_json_object() {
        let state = AuthState::from_json(json!({
            "me": { "jid": "123@s.whatsapp.net" },
            "noiseKey": "abc"
        }))
        .unwrap();

        assert!(state.is_identified());
        assert!(state.has("noiseKey"));
        assert!(!state.has("advSecretKey"));
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        for value in [json!(null), json!([1, 2]), json!("me"), json!(42)] {
            assert!(matches!(
                AuthState::from_json(value),
                Err(AuthStateError::NotAnObject(_))
            ));
        }
    }

    #[test]
    fn test_null_identity_is_not_bound() {
        let state = AuthState::from_json(json!({ "me": null })).unwrap();
        assert!(!state.is_identified());
    }

    #[test]
    fn test_populate_failure_leaves_state_untouched() {
        let mut state = AuthState::from_json(json!({ "me": { "jid": "a" } })).unwrap();
        let before = state.clone();

        assert!(state.populate_from_json(json!([1, 2, 3])).is_err());
        assert_eq!(state, before);

        state.populate_from_json(json!({ "other": 1 })).unwrap();
        assert!(!state.is_identified());
        assert!(state.has("other"));
    }

    #[test]
    fn test_new_state_is_empty_and_unpaired() {
        let state = AuthState::new();
        assert!(state.is_empty());
        assert!(!state.is_identified());
        assert_eq!(state.to_json(), json!({}));
    }

    fn arb_json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9+/=]{0,24}".prop_map(Value::String),
        ]
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        arb_json_leaf().prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        /// Serializing then deserializing yields an attribute-equal state
        #[test]
        fn auth_state_json_roundtrip(
            attrs in prop::collection::btree_map("[a-zA-Z]{1,12}", arb_json(), 0..8),
        ) {
            let original = AuthState::from_json(Value::Object(attrs.into_iter().collect())).unwrap();

            let bytes = serde_json::to_vec(&original.to_json()).unwrap();
            let parsed: Value = serde_json::from_slice(&bytes).unwrap();
            let restored = AuthState::from_json(parsed).unwrap();

            prop_assert_eq!(restored, original);
        }
    }
}
