//! Configure variables declared by index records.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Choice {
	pub name: String,
	#[serde(default)]
	pub description: String,
}

/// One variable a project needs answered before it configures. Values are
/// persisted into the workspace configuration so a variable is asked at
/// most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableSpec {
	/// A filesystem path, defaulting relative to an anchor variable.
	Pathname {
		#[serde(default)]
		description: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		base: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		default: Option<String>,
	},
	/// Exactly one of the listed choices.
	Single {
		#[serde(default)]
		description: String,
		choices: Vec<Choice>,
	},
	/// Any subset of the listed choices, stored space-separated.
	Multiple {
		#[serde(default)]
		description: String,
		choices: Vec<Choice>,
	},
	/// Informational value recorded as-is, never prompted.
	Metainfo { value: String },
}

impl VariableSpec {
	/// The value an unattended run settles on without asking: the declared
	/// default, the first choice, or the metainfo value.
	pub fn unattended_value(&self, base_value: Option<&str>) -> Option<String> {
		match self {
			VariableSpec::Pathname { default, .. } => {
				let default = default.as_deref()?;
				Some(match base_value {
					Some(base) => format!("{base}/{default}"),
					None => default.to_string(),
				})
			},
			VariableSpec::Single { choices, .. } => choices.first().map(|c| c.name.clone()),
			VariableSpec::Multiple { choices, .. } => choices.first().map(|c| c.name.clone()),
			VariableSpec::Metainfo { value } => Some(value.clone()),
		}
	}

	pub fn base(&self) -> Option<&str> {
		match self {
			VariableSpec::Pathname { base, .. } => base.as_deref(),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigureSpec {
	#[serde(default)]
	pub variables: BTreeMap<String, VariableSpec>,
}

impl ConfigureSpec {
	pub fn is_empty(&self) -> bool {
		self.variables.is_empty()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn pathname_default_is_anchored() {
		let v: VariableSpec = serde_json::from_str(
			r#"{"pathname": {"description": "install prefix", "base": "siteTop", "default": "usr"}}"#,
		)
		.unwrap();
		assert_eq!(v.base(), Some("siteTop"));
		assert_eq!(v.unattended_value(Some("/ws")).as_deref(), Some("/ws/usr"));
	}

	#[test]
	fn single_defaults_to_first_choice() {
		let v: VariableSpec = serde_json::from_str(
			r#"{"single": {"choices": [{"name": "gcc"}, {"name": "clang"}]}}"#,
		)
		.unwrap();
		assert_eq!(v.unattended_value(None).as_deref(), Some("gcc"));
	}

	#[test]
	fn metainfo_is_recorded_verbatim() {
		let v: VariableSpec = serde_json::from_str(r#"{"metainfo": {"value": "1.0"}}"#).unwrap();
		assert_eq!(v.unattended_value(None).as_deref(), Some("1.0"));
	}
}
