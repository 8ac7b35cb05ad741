// src/rpc.rs

use std::sync::OnceLock;

use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};

use crate::{client::Backend, error::PinsError};

fn function_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("function name pattern is valid")
    })
}

/// Checks that `name` is a plain SQL identifier before it is spliced into a URL path.
pub(crate) fn validate_function_name(name: &str) -> Result<(), PinsError> {
    if function_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(PinsError::InvalidFunctionName(name.to_string()))
    }
}

/// Calls database functions exposed by the backend's REST gateway.
///
/// Obtained from [`Backend::rpc`](crate::Backend::rpc). Each call is a
/// `POST /rest/v1/rpc/<function>` with the parameters as a JSON object; access control
/// (row-level security, `SECURITY DEFINER` checks) is enforced by the database, so the
/// client passes no visibility filters of its own.
#[derive(Debug)]
pub struct RpcHandle<'a> {
    client: &'a Backend,
}

impl<'a> RpcHandle<'a> {
    pub(crate) fn new(client: &'a Backend) -> Self {
        RpcHandle { client }
    }

    /// Runs the database function `function_name` with `params` and deserializes its result.
    ///
    /// # Type Parameters
    ///
    /// * `P`: Parameter type. Serialized as a JSON object whose keys match the function's
    ///   argument names.
    /// * `R`: The function's return type. Set-returning functions come back as a JSON array,
    ///   so use `Vec<_>` for those; `void` functions deserialize from `null`.
    ///
    /// # Errors
    ///
    /// `InvalidFunctionName` if the name is not a plain identifier, otherwise any transport,
    /// API or deserialization error from the request.
    ///
    /// ```rust,no_run
    /// use member_pins::{Backend, PinsError};
    /// use serde_json::json;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), PinsError> {
    /// # let backend = Backend::new("https://project.example.co", "anon")?;
    /// let total: i64 = backend
    ///     .rpc()
    ///     .call("count_active_members", &json!({ "since_days": 30 }))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call<P, R>(&self, function_name: &str, params: &P) -> Result<R, PinsError>
    where
        P: Serialize + Send + Sync,
        R: DeserializeOwned + Send + 'static,
    {
        validate_function_name(function_name)?;
        let endpoint = format!("rpc/{}", function_name);
        self.client.post(&endpoint, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_identifiers() {
        assert!(validate_function_name("get_nearby_member_pins").is_ok());
        assert!(validate_function_name("_private2").is_ok());
    }

    #[test]
    fn rejects_path_tricks() {
        for name in ["", "1abc", "get/../admin", "has role", "pins?x=1"] {
            assert!(
                matches!(
                    validate_function_name(name),
                    Err(PinsError::InvalidFunctionName(_))
                ),
                "{name:?} should be rejected"
            );
        }
    }
}
