use serde::Deserialize;

use crate::prelude::*;

/// Generic Fleet API response.
#[derive(Debug, Deserialize)]
pub struct Response<R> {
    response: Option<R>,

    #[serde(default)]
    error: Option<String>,

    #[serde(default)]
    error_description: Option<String>,
}

impl<R> From<Response<R>> for Result<R> {
    fn from(response: Response<R>) -> Self {
        match (response.response, response.error) {
            (Some(response), None) => Ok(response),
            (_, Some(error)) => match response.error_description {
                Some(description) if !description.is_empty() => {
                    bail!(r#"Fleet API error "{error}" ("{description}")"#)
                }
                _ => bail!(r#"Fleet API error "{error}""#),
            },
            (None, None) => bail!("Fleet API returned neither a response nor an error"),
        }
    }
}

/// Outcome of a vehicle command.
#[derive(Debug, Deserialize)]
pub struct CommandResult {
    result: bool,

    #[serde(default, alias = "string")]
    reason: String,
}

impl From<CommandResult> for Result {
    fn from(result: CommandResult) -> Self {
        // The vehicle refuses to set what is set already, that is fine:
        if result.result || result.reason.contains("already_set") {
            Ok(())
        } else {
            bail!(r#"command rejected: "{}""#, result.reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(json: &str) -> Result {
        let response = serde_json::from_str::<Response<CommandResult>>(json)?;
        Result::<CommandResult>::from(response)?.into()
    }

    #[test]
    fn test_command_ok() -> Result {
        command(r#"{"response": {"result": true, "reason": ""}}"#)
    }

    #[test]
    fn test_already_set_is_ok() -> Result {
        command(r#"{"response": {"result": false, "reason": "already_set"}}"#)?;
        command(r#"{"response": {"result": false, "string": "charge_limit already_set"}}"#)
    }

    #[test]
    fn test_rejected() {
        assert!(command(r#"{"response": {"result": false, "reason": "not_charging"}}"#).is_err());
    }

    #[test]
    fn test_error() {
        let error = command(
            r#"{"response": null, "error": "vehicle unavailable", "error_description": ""}"#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("vehicle unavailable"));
    }
}
