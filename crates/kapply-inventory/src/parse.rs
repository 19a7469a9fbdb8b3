use crate::{reference::placeholder, Error, ResourceReference, Result};

peg::parser! {
    pub grammar key_parser() for str {
        rule segment() -> &'input str
            = s:$((!['_' | '|'][_])+) { s };
        rule part() -> &'input str
            = s:$((!['|'][_])+) { s };

        pub rule key() -> ResourceReference
            = group:segment() "_" version:segment() "_" kind:segment()
              "|" namespace:part() "|" name:part() {
                ResourceReference {
                    group: placeholder::strip(group, placeholder::GROUP).to_owned(),
                    version: placeholder::strip(version, placeholder::VERSION).to_owned(),
                    kind: placeholder::strip(kind, placeholder::KIND).to_owned(),
                    namespace: Some(placeholder::strip(namespace, placeholder::NAMESPACE))
                        .filter(|ns| !ns.is_empty())
                        .map(ToOwned::to_owned),
                    name: placeholder::strip(name, placeholder::NAME).to_owned(),
                }
            }
    }
}

/// Parse canonical inventory key, inverse of [`ResourceReference::key`]
pub fn parse_key(input: &str) -> Result<ResourceReference> {
    key_parser::key(input).map_err(|source| Error::Key {
        key: input.to_owned(),
        source,
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn core_group() {
        assert_eq!(
            parse_key("~G_v1_ConfigMap|default|cm1").unwrap(),
            ResourceReference::new("v1", "ConfigMap", Some("default"), "cm1"),
        );
    }

    #[test]
    fn cluster_scoped() {
        let parsed = parse_key(
            "apiextensions.k8s.io_v1beta1_CustomResourceDefinition|~X|crontabs.stable.example.com",
        )
        .unwrap();
        assert_eq!(parsed.group, "apiextensions.k8s.io");
        assert_eq!(parsed.version, "v1beta1");
        assert_eq!(parsed.namespace, None);
        assert_eq!(parsed.name, "crontabs.stable.example.com");
    }

    #[test]
    fn malformed() {
        assert!(parse_key("").is_err());
        assert!(parse_key("~G_v1_ConfigMap|default").is_err());
        assert!(parse_key("~G_v1|default|cm1").is_err());
        assert!(parse_key("~G_v1_ConfigMap|default|cm1|extra").is_err());
    }
}
