//! The enumerated set of connection parameters, their semantic types and
//! defaults.

use crate::error::ValidationError;

/// Semantic type of a connection parameter's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    Bool,
    Int,
    Str,
    Path,
}

impl ParameterType {
    /// Parses a raw string according to this type.
    ///
    /// Booleans accept `true`/`false`/`yes`/`no`/`on`/`off`/`1`/`0`,
    /// case-insensitive. Integers are signed decimal. Strings and paths are
    /// taken verbatim.
    pub fn parse(self, parameter: &'static str, raw: &str) -> Result<Value, ValidationError> {
        match self {
            ParameterType::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(ValidationError::InvalidValue {
                    parameter,
                    expected: "boolean",
                    value: raw.to_string(),
                }),
            },
            ParameterType::Int => raw
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|_| ValidationError::InvalidValue {
                    parameter,
                    expected: "integer",
                    value: raw.to_string(),
                }),
            ParameterType::Str | ParameterType::Path => Ok(Value::Str(raw.to_string())),
        }
    }
}

/// A raw parameter value held by a [`Target`](crate::Target).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Str(String),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// A connection parameter.
///
/// Parameters are globally enumerated and looked up by name; unknown names
/// are an error. Each has a semantic type and, for most, a default that
/// applies while the parameter is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    Tls,
    Host,
    Port,
    Database,
    TableSchema,
    Table,
    Sock,
    SockDir,
    Cert,
    CertHash,
    ClientKey,
    ClientCert,
    ClientPem,
    User,
    Password,
    Language,
    Autocommit,
    Schema,
    Timezone,
    Binary,
    ReplySize,
}

impl Parameter {
    pub const ALL: &'static [Parameter] = &[
        Parameter::Tls,
        Parameter::Host,
        Parameter::Port,
        Parameter::Database,
        Parameter::TableSchema,
        Parameter::Table,
        Parameter::Sock,
        Parameter::SockDir,
        Parameter::Cert,
        Parameter::CertHash,
        Parameter::ClientKey,
        Parameter::ClientCert,
        Parameter::ClientPem,
        Parameter::User,
        Parameter::Password,
        Parameter::Language,
        Parameter::Autocommit,
        Parameter::Schema,
        Parameter::Timezone,
        Parameter::Binary,
        Parameter::ReplySize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Parameter::Tls => "tls",
            Parameter::Host => "host",
            Parameter::Port => "port",
            Parameter::Database => "database",
            Parameter::TableSchema => "tableschema",
            Parameter::Table => "table",
            Parameter::Sock => "sock",
            Parameter::SockDir => "sockdir",
            Parameter::Cert => "cert",
            Parameter::CertHash => "certhash",
            Parameter::ClientKey => "clientkey",
            Parameter::ClientCert => "clientcert",
            Parameter::ClientPem => "clientpem",
            Parameter::User => "user",
            Parameter::Password => "password",
            Parameter::Language => "language",
            Parameter::Autocommit => "autocommit",
            Parameter::Schema => "schema",
            Parameter::Timezone => "timezone",
            Parameter::Binary => "binary",
            Parameter::ReplySize => "replysize",
        }
    }

    pub fn param_type(self) -> ParameterType {
        match self {
            Parameter::Tls | Parameter::Autocommit => ParameterType::Bool,
            Parameter::Port | Parameter::Timezone | Parameter::ReplySize => ParameterType::Int,
            Parameter::Sock
            | Parameter::SockDir
            | Parameter::Cert
            | Parameter::ClientKey
            | Parameter::ClientCert
            | Parameter::ClientPem => ParameterType::Path,
            _ => ParameterType::Str,
        }
    }

    /// The value that applies while this parameter is unset, or `None` for
    /// parameters with no default (`timezone` is resolved by the caller, not
    /// from ambient process state).
    pub fn default(self) -> Option<Value> {
        let value = match self {
            Parameter::Tls => Value::Bool(false),
            Parameter::Autocommit => Value::Bool(true),
            Parameter::Port => Value::Int(-1),
            Parameter::ReplySize => Value::Int(250),
            Parameter::SockDir => Value::Str("/tmp".to_string()),
            Parameter::Language => Value::Str("sql".to_string()),
            Parameter::Binary => Value::Str("on".to_string()),
            Parameter::Timezone => return None,
            _ => Value::Str(String::new()),
        };
        Some(value)
    }

    /// Short note on where the parameter applies.
    pub fn note(self) -> &'static str {
        match self {
            Parameter::Tls => "require a TLS transport",
            Parameter::Host => "TCP host, empty for socket discovery",
            Parameter::Port => "TCP port, -1 for the default",
            Parameter::Database => "database to connect to",
            Parameter::TableSchema | Parameter::Table => "informational only",
            Parameter::Sock => "unix domain socket path",
            Parameter::SockDir => "directory searched for discovery sockets",
            Parameter::Cert => "trust anchor file, implies verify mode cert",
            Parameter::CertHash => "pinned sha256 digest, implies verify mode hash",
            Parameter::ClientKey | Parameter::ClientCert => "separate client identity files",
            Parameter::ClientPem => "combined client key and certificate file",
            Parameter::User | Parameter::Password => "credentials",
            Parameter::Language => "server language to select",
            Parameter::Autocommit => "autocommit after connect",
            Parameter::Timezone => "signed minute offset from UTC",
            Parameter::Binary => "binary result set level, bool or integer",
            Parameter::Schema => "schema to select after connect",
            Parameter::ReplySize => "rows fetched per reply",
        }
    }

    /// Resolves a parameter by name. `fetchsize` is accepted as an alias
    /// for `replysize`.
    pub fn for_name(name: &str) -> Option<Parameter> {
        if name == "fetchsize" {
            return Some(Parameter::ReplySize);
        }
        Parameter::ALL.iter().copied().find(|p| p.name() == name)
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_name_roundtrip() {
        for parm in Parameter::ALL {
            assert_eq!(Some(*parm), Parameter::for_name(parm.name()));
        }
    }

    #[test]
    fn test_fetchsize_alias() {
        assert_eq!(Some(Parameter::ReplySize), Parameter::for_name("fetchsize"));
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(None, Parameter::for_name("banana"));
    }

    #[test]
    fn test_bool_parsing() {
        for raw in ["true", "YES", "on", "1"] {
            assert_eq!(
                Value::Bool(true),
                ParameterType::Bool.parse("tls", raw).unwrap()
            );
        }
        for raw in ["false", "No", "OFF", "0"] {
            assert_eq!(
                Value::Bool(false),
                ParameterType::Bool.parse("tls", raw).unwrap()
            );
        }
        let err = ParameterType::Bool.parse("tls", "banana").unwrap_err();
        assert!(err.to_string().contains("tls"));
        assert!(err.to_string().contains("banana"));
    }

    #[test]
    fn test_int_parsing() {
        assert_eq!(
            Value::Int(-480),
            ParameterType::Int.parse("timezone", "-480").unwrap()
        );
        assert!(ParameterType::Int.parse("port", "50k").is_err());
    }
}
