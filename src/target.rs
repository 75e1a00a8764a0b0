//! Mutable holder of raw connection parameters.

use std::collections::{HashMap, HashSet};

use crate::error::ValidationError;
use crate::parameter::{Parameter, ParameterType, Value};

/// A mutable set of not-yet-validated connection parameters.
///
/// Values are assigned incrementally, from defaults, a parsed URL, and
/// explicit overrides, in any order. [`Target::validate`] turns the current
/// state into an immutable [`Validated`](crate::Validated) plan.
///
/// Every mutation bumps a generation counter so callers can cache a
/// validated plan and tell when it has gone stale.
#[derive(Debug, Clone, Default)]
pub struct Target {
    values: HashMap<Parameter, Value>,
    touched: HashSet<Parameter>,
    generation: u64,
}

impl Target {
    pub fn new() -> Self {
        Target::default()
    }

    /// Parses `raw` according to the named parameter's semantic type and
    /// stores it. Unknown names and type mismatches are validation errors
    /// naming the parameter and the offending value.
    pub fn set_string(&mut self, name: &str, raw: &str) -> Result<(), ValidationError> {
        let parm = Parameter::for_name(name)
            .ok_or_else(|| ValidationError::UnknownParameter(name.to_string()))?;
        let value = parm.param_type().parse(parm.name(), raw)?;
        self.set(parm, value)
    }

    /// Stores an already-typed value, rejecting a value whose variant does
    /// not match the parameter's semantic type.
    pub fn set(&mut self, parm: Parameter, value: Value) -> Result<(), ValidationError> {
        let matches = match parm.param_type() {
            ParameterType::Bool => value.as_bool().is_some(),
            ParameterType::Int => value.as_int().is_some(),
            ParameterType::Str | ParameterType::Path => value.as_str().is_some(),
        };
        if !matches {
            return Err(ValidationError::InvalidValue {
                parameter: parm.name(),
                expected: match parm.param_type() {
                    ParameterType::Bool => "boolean",
                    ParameterType::Int => "integer",
                    ParameterType::Str | ParameterType::Path => "string",
                },
                value: value.to_string(),
            });
        }
        self.values.insert(parm, value);
        self.touched.insert(parm);
        self.generation += 1;
        Ok(())
    }

    /// The current value, or the parameter's default while unset. `None`
    /// only for parameters without a default.
    pub fn get(&self, parm: Parameter) -> Option<Value> {
        match self.values.get(&parm) {
            Some(v) => Some(v.clone()),
            None => parm.default(),
        }
    }

    pub(crate) fn get_str(&self, parm: Parameter) -> String {
        self.get(parm)
            .and_then(|v| v.as_str().map(str::to_string))
            .expect("parameter is a string")
    }

    pub(crate) fn get_bool(&self, parm: Parameter) -> bool {
        self.get(parm)
            .and_then(|v| v.as_bool())
            .expect("parameter is a bool")
    }

    pub(crate) fn get_int(&self, parm: Parameter) -> Option<i32> {
        self.get(parm).map(|v| v.as_int().expect("parameter is an int"))
    }

    /// Commits the current state as a checkpoint.
    ///
    /// A password belongs to the user it was set with: if `user` changed
    /// since the previous barrier but `password` did not, the stale password
    /// is cleared. Call this between merging parameter sources (defaults,
    /// then URL, then explicit overrides).
    pub fn barrier(&mut self) {
        if self.touched.contains(&Parameter::User) && !self.touched.contains(&Parameter::Password) {
            self.values
                .insert(Parameter::Password, Value::Str(String::new()));
        }
        self.touched.clear();
        self.generation += 1;
    }

    /// Monotonic counter bumped on every mutation; a cached
    /// [`Validated`](crate::Validated) plan is only good for the generation
    /// it was derived from.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let target = Target::new();
        for parm in Parameter::ALL {
            let Some(expected) = parm.default() else {
                continue;
            };
            assert_eq!(Some(expected), target.get(*parm), "for parameter {parm}");
        }
    }

    #[test]
    fn test_set_string_types() {
        let mut target = Target::new();
        target.set_string("port", "50001").unwrap();
        target.set_string("tls", "yes").unwrap();
        target.set_string("host", "db.example.com").unwrap();
        assert_eq!(Some(Value::Int(50001)), target.get(Parameter::Port));
        assert_eq!(Some(Value::Bool(true)), target.get(Parameter::Tls));
        assert_eq!(
            Some(Value::Str("db.example.com".into())),
            target.get(Parameter::Host)
        );
    }

    #[test]
    fn test_set_string_unknown() {
        let mut target = Target::new();
        let err = target.set_string("bananas", "3").unwrap_err();
        assert_eq!(ValidationError::UnknownParameter("bananas".into()), err);
    }

    #[test]
    fn test_set_rejects_mismatched_type() {
        let mut target = Target::new();
        let err = target
            .set(Parameter::Tls, Value::Str("definitely".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidValue {
                parameter: "tls",
                expected: "boolean",
                ..
            }
        ));
        let err = target.set(Parameter::Port, Value::Bool(true)).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidValue { parameter: "port", .. }
        ));
        // the rejected values were not stored, so validation still succeeds
        target.validate().unwrap();
    }

    #[test]
    fn test_barrier_clears_stale_password() {
        let mut target = Target::new();
        target.set_string("user", "alice").unwrap();
        target.set_string("password", "secret").unwrap();
        target.barrier();
        assert_eq!(Some(Value::Str("secret".into())), target.get(Parameter::Password));

        // a new user without a new password invalidates the old one
        target.set_string("user", "bob").unwrap();
        target.barrier();
        assert_eq!(Some(Value::Str(String::new())), target.get(Parameter::Password));
    }

    #[test]
    fn test_barrier_keeps_password_set_in_same_era() {
        let mut target = Target::new();
        target.set_string("user", "alice").unwrap();
        target.set_string("password", "secret").unwrap();
        target.barrier();
        target.set_string("password", "hunter2").unwrap();
        target.set_string("user", "bob").unwrap();
        target.barrier();
        assert_eq!(
            Some(Value::Str("hunter2".into())),
            target.get(Parameter::Password)
        );
    }

    #[test]
    fn test_generation_bumps() {
        let mut target = Target::new();
        let g0 = target.generation();
        target.set_string("host", "localhost").unwrap();
        assert!(target.generation() > g0);
        let g1 = target.generation();
        target.barrier();
        assert!(target.generation() > g1);
    }
}
