use std::collections::HashMap;

/// A template for file names, e.g. `cpl_%i` where `%i` is replaced with an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFormat {
    specification: String,
}

impl NameFormat {
    pub fn new<T: Into<String>>(specification: T) -> Self {
        Self {
            specification: specification.into(),
        }
    }

    pub fn specification(&self) -> &str {
        &self.specification
    }

    /// Expand the template.
    ///
    /// Each `%c` whose `c` is a key of `values` is replaced by that value.
    /// Characters which are awkward in file names are filtered from the result.
    pub fn get(&self, values: &HashMap<char, String>, suffix: &str) -> String {
        let mut result = String::new();
        let mut chars = self.specification.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '%'
                && let Some(key) = chars.peek()
                && let Some(value) = values.get(key)
            {
                result.extend(value.chars().map(filter));
                chars.next();
                continue;
            }

            result.push(filter(c));
        }

        result + suffix
    }
}

impl Default for NameFormat {
    fn default() -> Self {
        Self::new("%t_%i")
    }
}

fn filter(c: char) -> char {
    match c {
        '/' | ':' => '-',
        ' ' => '_',
        x => x,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_keys() {
        let values = HashMap::from([('t', "cpl".to_owned()), ('i', "abc".to_owned())]);
        assert_eq!(NameFormat::default().get(&values, ".xml"), "cpl_abc.xml");
    }

    #[test]
    fn leaves_unknown_keys_and_filters() {
        let values = HashMap::from([('t', "a b/c".to_owned())]);
        assert_eq!(NameFormat::new("%t:%z").get(&values, ""), "a_b-c-%z");
    }
}
