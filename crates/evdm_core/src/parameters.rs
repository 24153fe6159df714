//! Typed key/value metadata attached to frames and runs.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod sealed {
    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for String {}
}

/// A value type that can be stored in [`GenericParameters`].
///
/// Implemented for `i32`, `f32`, `f64` and `String`; each has its own key
/// space.
pub trait ParameterValue: sealed::Sealed + Clone + Sized + 'static {
    /// Name of the value type, used in errors.
    const TYPE_NAME: &'static str;

    #[doc(hidden)]
    fn map(params: &GenericParameters) -> &BTreeMap<String, Vec<Self>>;

    #[doc(hidden)]
    fn map_mut(params: &mut GenericParameters) -> &mut BTreeMap<String, Vec<Self>>;
}

macro_rules! parameter_value {
    ($ty:ty, $field:ident, $name:literal) => {
        impl ParameterValue for $ty {
            const TYPE_NAME: &'static str = $name;

            fn map(params: &GenericParameters) -> &BTreeMap<String, Vec<Self>> {
                &params.$field
            }

            fn map_mut(params: &mut GenericParameters) -> &mut BTreeMap<String, Vec<Self>> {
                &mut params.$field
            }
        }
    };
}

parameter_value!(i32, ints, "int");
parameter_value!(f32, floats, "float");
parameter_value!(f64, doubles, "double");
parameter_value!(String, strings, "string");

/// String-keyed parameters with one key space per value type.
///
/// A value is stored as a sequence; a single value is a sequence of length
/// one. Maps are sorted so that encoded parameters are deterministic.
///
/// ```
/// use evdm_core::GenericParameters;
///
/// let mut params = GenericParameters::new();
/// params.set_value("run", 1042_i32);
/// params.set_values("weights", vec![0.5_f32, 0.25]);
///
/// assert_eq!(params.get_int_val("run").unwrap(), 1042);
/// let mut weights = Vec::new();
/// assert_eq!(params.get_values::<f32>("weights", &mut weights).len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericParameters {
    ints: BTreeMap<String, Vec<i32>>,
    floats: BTreeMap<String, Vec<f32>>,
    doubles: BTreeMap<String, Vec<f64>>,
    strings: BTreeMap<String, Vec<String>>,
}

impl GenericParameters {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a single value under `key`, replacing any previous values.
    pub fn set_value<T: ParameterValue>(&mut self, key: impl Into<String>, value: T) {
        T::map_mut(self).insert(key.into(), vec![value]);
    }

    /// Stores a value sequence under `key`, replacing any previous values.
    pub fn set_values<T: ParameterValue>(&mut self, key: impl Into<String>, values: Vec<T>) {
        T::map_mut(self).insert(key.into(), values);
    }

    /// Returns the first value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ParameterNotFound`] if no value of type `T` is
    /// stored under `key`.
    pub fn get_value<T: ParameterValue>(&self, key: &str) -> CoreResult<T> {
        T::map(self)
            .get(key)
            .and_then(|values| values.first())
            .cloned()
            .ok_or_else(|| CoreError::ParameterNotFound {
                key: key.to_string(),
                type_name: T::TYPE_NAME,
            })
    }

    /// Appends all values stored under `key` to `out` and returns it.
    ///
    /// An absent key appends nothing.
    pub fn get_values<'a, T: ParameterValue>(
        &self,
        key: &str,
        out: &'a mut Vec<T>,
    ) -> &'a mut Vec<T> {
        if let Some(values) = T::map(self).get(key) {
            out.extend(values.iter().cloned());
        }
        out
    }

    /// Returns the values stored under `key` without copying.
    #[must_use]
    pub fn values<T: ParameterValue>(&self, key: &str) -> Option<&[T]> {
        T::map(self).get(key).map(Vec::as_slice)
    }

    /// Returns the number of values stored under `key` (zero when absent).
    #[must_use]
    pub fn count<T: ParameterValue>(&self, key: &str) -> usize {
        T::map(self).get(key).map_or(0, Vec::len)
    }

    /// Returns the keys holding values of type `T`, sorted.
    #[must_use]
    pub fn keys<T: ParameterValue>(&self) -> Vec<&str> {
        T::map(self).keys().map(String::as_str).collect()
    }

    /// Returns the whole map for values of type `T`.
    #[must_use]
    pub fn map<T: ParameterValue>(&self) -> &BTreeMap<String, Vec<T>> {
        T::map(self)
    }

    /// Returns the whole map for values of type `T`, mutably.
    pub fn map_mut<T: ParameterValue>(&mut self) -> &mut BTreeMap<String, Vec<T>> {
        T::map_mut(self)
    }

    /// Removes the values of type `T` stored under `key`.
    pub fn remove<T: ParameterValue>(&mut self, key: &str) -> Option<Vec<T>> {
        T::map_mut(self).remove(key)
    }

    /// Removes every parameter.
    pub fn clear(&mut self) {
        self.ints.clear();
        self.floats.clear();
        self.doubles.clear();
        self.strings.clear();
    }

    /// Returns `true` if no parameter is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ints.is_empty()
            && self.floats.is_empty()
            && self.doubles.is_empty()
            && self.strings.is_empty()
    }

    /// Returns the first `int` value under `key`.
    pub fn get_int_val(&self, key: &str) -> CoreResult<i32> {
        self.get_value(key)
    }

    /// Returns the first `float` value under `key`.
    pub fn get_float_val(&self, key: &str) -> CoreResult<f32> {
        self.get_value(key)
    }

    /// Returns the first `double` value under `key`.
    pub fn get_double_val(&self, key: &str) -> CoreResult<f64> {
        self.get_value(key)
    }

    /// Returns the first `string` value under `key`.
    pub fn get_string_val(&self, key: &str) -> CoreResult<String> {
        self.get_value(key)
    }

    /// Appends the `int` values under `key` to `out`.
    pub fn get_int_vals<'a>(&self, key: &str, out: &'a mut Vec<i32>) -> &'a mut Vec<i32> {
        self.get_values(key, out)
    }

    /// Appends the `float` values under `key` to `out`.
    pub fn get_float_vals<'a>(&self, key: &str, out: &'a mut Vec<f32>) -> &'a mut Vec<f32> {
        self.get_values(key, out)
    }

    /// Appends the `double` values under `key` to `out`.
    pub fn get_double_vals<'a>(&self, key: &str, out: &'a mut Vec<f64>) -> &'a mut Vec<f64> {
        self.get_values(key, out)
    }

    /// Appends the `string` values under `key` to `out`.
    pub fn get_string_vals<'a>(
        &self,
        key: &str,
        out: &'a mut Vec<String>,
    ) -> &'a mut Vec<String> {
        self.get_values(key, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value() {
        let mut params = GenericParameters::new();
        params.set_value("run", 42_i32);

        assert_eq!(params.get_int_val("run").unwrap(), 42);
        assert_eq!(params.count::<i32>("run"), 1);
    }

    #[test]
    fn first_of_many() {
        let mut params = GenericParameters::new();
        params.set_values("energies", vec![1.5_f64, 2.5, 3.5]);

        assert_eq!(params.get_double_val("energies").unwrap(), 1.5);
        assert_eq!(params.count::<f64>("energies"), 3);
    }

    #[test]
    fn float_values_through_the_f32_path() {
        let mut params = GenericParameters::new();
        params.set_values("energies", vec![1.0_f32, 2.5, 3.25]);

        assert_eq!(params.get_float_val("energies").unwrap(), 1.0);
        let mut out = Vec::new();
        assert_eq!(params.get_float_vals("energies", &mut out), &vec![1.0, 2.5, 3.25]);
        assert!(params.values::<f64>("energies").is_none());
    }

    #[test]
    fn key_spaces_are_per_type() {
        let mut params = GenericParameters::new();
        params.set_value("x", 1_i32);
        params.set_value("x", "one".to_string());

        assert_eq!(params.get_int_val("x").unwrap(), 1);
        assert_eq!(params.get_string_val("x").unwrap(), "one");
        assert!(matches!(
            params.get_float_val("x"),
            Err(CoreError::ParameterNotFound {
                type_name: "float",
                ..
            })
        ));
    }

    #[test]
    fn absent_key_appends_nothing() {
        let params = GenericParameters::new();
        let mut out = vec![7_i32];
        assert_eq!(params.get_int_vals("missing", &mut out), &vec![7]);
    }

    #[test]
    fn get_values_appends() {
        let mut params = GenericParameters::new();
        params.set_values("tags", vec!["a".to_string(), "b".to_string()]);

        let mut out = vec!["z".to_string()];
        params.get_string_vals("tags", &mut out);
        assert_eq!(out, vec!["z", "a", "b"]);
    }

    #[test]
    fn set_replaces() {
        let mut params = GenericParameters::new();
        params.set_values("w", vec![1.0_f32, 2.0]);
        params.set_value("w", 3.0_f32);
        assert_eq!(params.values::<f32>("w"), Some(&[3.0_f32][..]));
    }

    #[test]
    fn keys_are_sorted() {
        let mut params = GenericParameters::new();
        params.set_value("beta", 2_i32);
        params.set_value("alpha", 1_i32);
        params.set_value("gamma", 0.5_f32);

        assert_eq!(params.keys::<i32>(), vec!["alpha", "beta"]);
        assert_eq!(params.keys::<f32>(), vec!["gamma"]);
        assert!(params.keys::<String>().is_empty());
    }

    #[test]
    fn clear_and_remove() {
        let mut params = GenericParameters::new();
        params.set_value("a", 1_i32);
        params.set_value("b", 2.0_f64);
        assert_eq!(params.remove::<i32>("a"), Some(vec![1]));
        assert!(!params.is_empty());

        params.clear();
        assert!(params.is_empty());
    }

    #[test]
    fn map_access() {
        let mut params = GenericParameters::new();
        params
            .map_mut::<String>()
            .insert("detector".to_string(), vec!["calo".to_string()]);
        assert_eq!(params.map::<String>().len(), 1);
        assert_eq!(params.get_string_val("detector").unwrap(), "calo");
    }

    #[test]
    fn survives_cbor() {
        let mut params = GenericParameters::new();
        params.set_value("run", 7_i32);
        params.set_values("thresholds", vec![0.1_f32, 0.2]);
        params.set_value("lumi", 1.25_f64);
        params.set_value("tag", "physics".to_string());

        let bytes = evdm_codec::to_cbor(&params).unwrap();
        let decoded: GenericParameters = evdm_codec::from_cbor(&bytes).unwrap();
        assert_eq!(decoded, params);
    }

    proptest::proptest! {
        #[test]
        fn get_values_accumulates(
            first in proptest::collection::vec(proptest::num::f64::NORMAL, 0..8),
            second in proptest::collection::vec(proptest::num::f64::NORMAL, 0..8),
        ) {
            let mut params = GenericParameters::new();
            params.set_values("a", first.clone());
            params.set_values("b", second.clone());

            let mut out = Vec::new();
            params.get_values::<f64>("a", &mut out);
            params.get_values::<f64>("missing", &mut out);
            params.get_values::<f64>("b", &mut out);

            let expected: Vec<f64> = first.iter().chain(&second).copied().collect();
            proptest::prop_assert_eq!(out, expected);
            proptest::prop_assert_eq!(params.count::<f64>("a"), first.len());
        }
    }
}
