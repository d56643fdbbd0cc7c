//! Ordered header mapping shared by the pipeline stages.
//!
//! Names are stored exactly as received and [`Headers::insert`] is
//! last-write-wins per exact name, so `X-Id` and `x-id` are two entries.
//! The `*_ignore_case` helpers exist for protocol decisions (exclusion
//! lists, cookie extraction) where HTTP treats names case-insensitively.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`. An existing entry with the exact same name is
    /// overwritten in place; otherwise the pair is appended.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Last entry whose name matches ignoring ASCII case.
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Removes every entry matching `name` ignoring ASCII case and returns
    /// the value of the last one removed.
    pub fn remove_ignore_case(&mut self, name: &str) -> Option<String> {
        self.remove_all_ignore_case(name).pop()
    }

    /// Removes every entry matching `name` ignoring ASCII case and returns
    /// their values in stored order.
    pub fn remove_all_ignore_case(&mut self, name: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain_mut(|(n, v)| {
            if n.eq_ignore_ascii_case(name) {
                removed.push(std::mem::take(v));
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.entries.retain(|(n, v)| keep(n, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_exact_name_in_place() {
        let mut headers = Headers::new();
        headers.insert("Accept", "text/html");
        headers.insert("X-Id", "1");
        headers.insert("Accept", "application/json");

        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("Accept", "application/json"), ("X-Id", "1")]);
    }

    #[test]
    fn names_are_case_sensitive_for_storage() {
        let headers: Headers = [("X-Id", "1"), ("x-id", "2")].into_iter().collect();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("X-Id"), Some("1"));
        assert_eq!(headers.get("x-id"), Some("2"));
        assert_eq!(headers.get("X-ID"), None);
        assert_eq!(headers.get_ignore_case("X-ID"), Some("2"));
    }

    #[test]
    fn remove_ignore_case_drops_all_variants() {
        let mut headers: Headers = [("Cookie", "a=1"), ("cookie", "b=2"), ("Accept", "*/*")]
            .into_iter()
            .collect();

        assert_eq!(headers.remove_ignore_case("COOKIE"), Some("b=2".to_string()));
        assert!(!headers.contains_ignore_case("cookie"));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.remove_ignore_case("Cookie"), None);
    }

    #[test]
    fn remove_all_ignore_case_keeps_order() {
        let mut headers: Headers = [("Cookie", "a=1"), ("Accept", "*/*"), ("cookie", "b=2")]
            .into_iter()
            .collect();

        assert_eq!(headers.remove_all_ignore_case("COOKIE"), vec!["a=1", "b=2"]);
        assert_eq!(headers.len(), 1);
        assert!(headers.remove_all_ignore_case("Cookie").is_empty());
    }
}
