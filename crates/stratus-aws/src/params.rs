//! Query-protocol parameter maps with AWS's indexed-array conventions.

use std::collections::BTreeMap;

/// Flat `key → value` parameters; arrays are spelled out as `Prefix.N.Field`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: BTreeMap<String, String>,
    filters: usize,
    rds_filters: usize,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.inner.insert(key.into(), value.into());
        self
    }

    /// Set only when `value` is non-empty.
    pub fn set_opt(&mut self, key: &str, value: &str) -> &mut Self {
        if !value.is_empty() {
            self.set(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.inner.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// `Prefix.1`, `Prefix.2`, ... for each value.
    pub fn members<S: AsRef<str>>(&mut self, prefix: &str, values: &[S]) -> &mut Self {
        for (i, v) in values.iter().enumerate() {
            self.set(format!("{}.{}", prefix, i + 1), v.as_ref());
        }
        self
    }

    /// EC2 `Filter.N.Name` / `Filter.N.Value.M`, numbered across calls.
    pub fn filter<S: AsRef<str>>(&mut self, name: &str, values: &[S]) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        self.filters += 1;
        let n = self.filters;
        self.set(format!("Filter.{}.Name", n), name);
        for (i, v) in values.iter().enumerate() {
            self.set(format!("Filter.{}.Value.{}", n, i + 1), v.as_ref());
        }
        self
    }

    /// RDS `Filters.Filter.N.Name` / `Filters.Filter.N.Values.Value.M`.
    pub fn rds_filter<S: AsRef<str>>(&mut self, name: &str, values: &[S]) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        self.rds_filters += 1;
        let n = self.rds_filters;
        self.set(format!("Filters.Filter.{}.Name", n), name);
        for (i, v) in values.iter().enumerate() {
            self.set(format!("Filters.Filter.{}.Values.Value.{}", n, i + 1), v.as_ref());
        }
        self
    }

    /// `TagSpecification.N.ResourceType` with its `Tag.M.Key` / `Tag.M.Value` pairs.
    pub fn tag_specification(
        &mut self,
        index: usize,
        resource_type: &str,
        tags: &BTreeMap<String, String>,
    ) -> &mut Self {
        let prefix = format!("TagSpecification.{}", index);
        self.set(format!("{}.ResourceType", prefix), resource_type);
        for (i, (k, v)) in tags.iter().enumerate() {
            self.set(format!("{}.Tag.{}.Key", prefix, i + 1), k.as_str());
            self.set(format!("{}.Tag.{}.Value", prefix, i + 1), v.as_str());
        }
        self
    }

    /// `{prefix}.N.Key` / `{prefix}.N.Value` pairs (`Tag`, `Tags.member`, `Tags.Tag`).
    pub fn tags(&mut self, prefix: &str, tags: &BTreeMap<String, String>) -> &mut Self {
        for (i, (k, v)) in tags.iter().enumerate() {
            self.set(format!("{}.{}.Key", prefix, i + 1), k.as_str());
            self.set(format!("{}.{}.Value", prefix, i + 1), v.as_str());
        }
        self
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.inner
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.inner
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}
