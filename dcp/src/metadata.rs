use chrono::Local;

/// Issuer, creator and issue date stamped into every XML document we write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlMetadata {
    pub issuer: String,
    pub creator: String,
    pub issue_date: String,
}

impl XmlMetadata {
    pub fn new<T: Into<String>>(issuer: T, creator: T, issue_date: T) -> Self {
        Self {
            issuer: issuer.into(),
            creator: creator.into(),
            issue_date: issue_date.into(),
        }
    }

    /// Set the issue date to the current local time.
    pub fn set_issue_date_now(&mut self) {
        self.issue_date = Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string();
    }
}

impl Default for XmlMetadata {
    fn default() -> Self {
        let product = concat!("dcp ", env!("CARGO_PKG_VERSION"));
        let mut metadata = Self::new(product, product, "");
        metadata.set_issue_date_now();
        metadata
    }
}
