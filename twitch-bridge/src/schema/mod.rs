//! Parameter schemas for operations and bus events.
//!
//! Inbound calls are checked before they reach a transport; outbound payloads
//! are checked before they reach the bus. A [`Schema`] is a flat description
//! of a JSON object: each field has a [`FieldKind`] and may be optional.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Operation schema names.
pub const JOIN: &str = "join";
pub const SAY: &str = "say";
pub const WHISPER: &str = "whisper";
pub const AUTH_OPTIONS: &str = "auth.options";

/// Expected type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A string, optionally of an exact length in characters.
    String { len: Option<usize> },
    Boolean,
    /// Anything, including `null`.
    Any,
    Object(Schema),
}

impl FieldKind {
    pub fn string() -> Self {
        Self::String { len: None }
    }

    pub fn string_len(len: usize) -> Self {
        Self::String { len: Some(len) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub optional: bool,
}

/// Description of a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
}

/// One failing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Dotted path to the field (`attributes.replyTo`); empty for the root.
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "'{}' {}", self.path, self.message)
        }
    }
}

/// Parameters did not match a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid '{schema}' parameters: {}", format_issues(.issues))]
pub struct ValidationError {
    pub schema: String,
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// A single issue at `path`.
    pub fn single(
        schema: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            issues: vec![FieldIssue {
                path: path.into(),
                message: message.into(),
            }],
        }
    }

    /// Whether any issue concerns `path`.
    pub fn has_issue_at(&self, path: &str) -> bool {
        self.issues.iter().any(|i| i.path == path)
    }
}

fn format_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field.
    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.into(),
            kind,
            optional: false,
        });
        self
    }

    /// Add an optional field.
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.into(),
            kind,
            optional: true,
        });
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Validate `value`, reporting every failing field.
    pub fn validate(&self, schema: &str, value: &Value) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        self.collect_issues("", value, &mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                schema: schema.to_string(),
                issues,
            })
        }
    }

    fn collect_issues(&self, prefix: &str, value: &Value, issues: &mut Vec<FieldIssue>) {
        let Some(object) = value.as_object() else {
            issues.push(FieldIssue {
                path: prefix.to_string(),
                message: format!("must be an object, got {}", type_name(value)),
            });
            return;
        };

        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{prefix}.{}", field.name)
            };

            let value = match object.get(&field.name) {
                None | Some(Value::Null) if field.optional => continue,
                None => {
                    issues.push(FieldIssue {
                        path,
                        message: "is required".to_string(),
                    });
                    continue;
                }
                Some(value) => value,
            };

            match &field.kind {
                FieldKind::Any => {}
                FieldKind::Boolean => {
                    if !value.is_boolean() {
                        issues.push(FieldIssue {
                            path,
                            message: format!("must be a boolean, got {}", type_name(value)),
                        });
                    }
                }
                FieldKind::String { len } => match value.as_str() {
                    Some(s) => {
                        if let Some(len) = len {
                            let actual = s.chars().count();
                            if actual != *len {
                                issues.push(FieldIssue {
                                    path,
                                    message: format!(
                                        "must be exactly {len} characters long, got {actual}"
                                    ),
                                });
                            }
                        }
                    }
                    None => issues.push(FieldIssue {
                        path,
                        message: format!("must be a string, got {}", type_name(value)),
                    }),
                },
                FieldKind::Object(inner) => inner.collect_issues(&path, value, issues),
            }
        }
    }
}

/// Named schemas for operations and events.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every Twitch operation and event schema.
    pub fn twitch() -> Self {
        let string = FieldKind::string;
        let mut registry = Self::new();

        // Operations
        registry.register(JOIN, Schema::new().required("channel", string()));
        registry.register(
            SAY,
            Schema::new()
                .required("channel", string())
                .required("message", string())
                .optional(
                    "attributes",
                    FieldKind::Object(Schema::new().optional("replyTo", string())),
                ),
        );
        registry.register(
            WHISPER,
            Schema::new()
                .required("user", string())
                .required("message", string()),
        );
        registry.register(
            AUTH_OPTIONS,
            Schema::new()
                .required("clientId", FieldKind::string_len(30))
                .required("clientSecret", FieldKind::string_len(30))
                .optional("refreshToken", string()),
        );

        // Chat events
        let chat_message = || {
            Schema::new()
                .required("channel", string())
                .required("user", string())
                .required("message", string())
                .required("msg", FieldKind::Any)
        };
        let channel_reason = || {
            Schema::new()
                .required("channel", string())
                .required("reason", string())
        };
        registry.register("chat.action", chat_message());
        registry.register("chat.connect", Schema::new());
        registry.register(
            "chat.disconnect",
            Schema::new()
                .required("manually", FieldKind::Boolean)
                .optional("reason", FieldKind::Any),
        );
        registry.register(
            "chat.join",
            Schema::new()
                .required("channel", string())
                .required("user", string()),
        );
        registry.register("chat.joinFailure", channel_reason());
        registry.register("chat.message", chat_message());
        registry.register("chat.messageFailed", channel_reason());
        registry.register(
            "chat.messageRatelimit",
            Schema::new()
                .required("channel", string())
                .required("message", string()),
        );
        registry.register("chat.register", Schema::new());
        registry.register(
            "chat.whisper",
            Schema::new()
                .required("user", string())
                .required("message", string())
                .required("msg", FieldKind::Any),
        );

        // Auth events
        registry.register("auth.created", Schema::new().required("instance", string()));
        registry.register("auth.refreshed", Schema::new().required("instance", string()));

        registry
    }

    pub fn register(&mut self, name: impl Into<String>, schema: Schema) {
        self.schemas.insert(name.into(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Validate `value` against the schema called `name`.
    ///
    /// An unknown name is reported as a root-level issue.
    pub fn check(&self, name: &str, value: &Value) -> Result<(), ValidationError> {
        match self.schemas.get(name) {
            Some(schema) => schema.validate(name, value),
            None => Err(ValidationError::single(name, "", "no schema registered")),
        }
    }
}
