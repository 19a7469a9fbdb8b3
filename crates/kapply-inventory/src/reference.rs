use std::{
    fmt::{self, Display},
    str::FromStr,
};

pub(crate) mod placeholder {
    pub const GROUP: &str = "~G";
    pub const VERSION: &str = "~V";
    pub const KIND: &str = "~K";
    pub const NAMESPACE: &str = "~X";
    pub const NAME: &str = "~N";

    pub fn fill<'a>(value: &'a str, placeholder: &'static str) -> &'a str {
        if value.is_empty() {
            placeholder
        } else {
            value
        }
    }

    pub fn strip<'a>(value: &'a str, placeholder: &str) -> &'a str {
        if value == placeholder {
            ""
        } else {
            value
        }
    }
}

fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Object runtime type, `apps/v1 Deployment`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceType {
    /// Empty for the core group
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceType {
    pub fn new(api_version: &str, kind: &str) -> Self {
        let (group, version) = split_api_version(api_version);
        Self {
            group: group.to_owned(),
            version: version.to_owned(),
            kind: kind.to_owned(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.api_version(), self.kind)
    }
}

/// Identifies single live object regardless of its content.
///
/// Two references are equal only if all five fields match.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceReference {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// `None` for cluster-scoped objects
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceReference {
    pub fn new(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Self {
        let (group, version) = split_api_version(api_version);
        Self {
            group: group.to_owned(),
            version: version.to_owned(),
            kind: kind.to_owned(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(ToOwned::to_owned),
            name: name.to_owned(),
        }
    }

    pub fn api_version(&self) -> String {
        self.resource_type().api_version()
    }

    pub fn resource_type(&self) -> ResourceType {
        ResourceType {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
        }
    }

    /// Canonical inventory key: `<group>_<version>_<kind>|<namespace>|<name>`
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}|{}|{}",
            placeholder::fill(&self.group, placeholder::GROUP),
            placeholder::fill(&self.version, placeholder::VERSION),
            placeholder::fill(&self.kind, placeholder::KIND),
            placeholder::fill(
                self.namespace.as_deref().unwrap_or_default(),
                placeholder::NAMESPACE
            ),
            placeholder::fill(&self.name, placeholder::NAME),
        )
    }
}

impl FromStr for ResourceReference {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parse_key(s)
    }
}

impl Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.api_version(), self.kind, self.name)?;
        if let Some(ns) = &self.namespace {
            write!(f, " in {}", ns)?;
        }
        Ok(())
    }
}
