use serde::{Deserialize, Serialize};

/// Canonical attribute names, in training column order. The same six names are
/// the prediction input keys; `price` is appended as the last (target) column.
pub const ATTRIBUTES: [&str; 6] = [
    "processor",
    "disk",
    "ram",
    "os",
    "condition",
    "graphic_card",
];

/// Catch-all bucket for raw values matching no rule, and for absent fields.
pub const DEFAULT_LABEL: &str = "Other";

/// One substring-trigger rule. Matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub trigger: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRules {
    pub attribute: String,
    /// Tested in order; first match wins. Order matters where one trigger is a
    /// substring of another ("Dobry" inside "Bardzo dobry", "4" inside "64").
    pub rules: Vec<Rule>,
    pub default: String,
}

/// The fixed per-attribute rule tables mapping raw free-text values to a small
/// canonical vocabulary. One instance is carried inside the persisted model
/// artifact and serves both the training pass and every inference request, so
/// the two paths can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    attributes: Vec<AttributeRules>,
}

impl CategoryVocabulary {
    pub fn builtin() -> Self {
        Self {
            attributes: vec![
                table(
                    "processor",
                    &[
                        ("i3", "Intel i3"),
                        ("i5", "Intel i5"),
                        ("i7", "Intel i7"),
                        ("i9", "Intel i9"),
                        ("Ryzen 3", "AMD Ryzen 3"),
                        ("Ryzen 5", "AMD Ryzen 5"),
                        ("Ryzen 7", "AMD Ryzen 7"),
                        ("Ryzen 9", "AMD Ryzen 9"),
                        ("Xeon", "Intel Xeon"),
                    ],
                ),
                table(
                    "disk",
                    &[("NVMe", "NVMe SSD"), ("SSD", "SSD"), ("HDD", "HDD")],
                ),
                // Largest sizes first: "4" is a substring of "64", "8" of "128".
                table(
                    "ram",
                    &[
                        ("128", "128 GB"),
                        ("64", "64 GB"),
                        ("32", "32 GB"),
                        ("16", "16 GB"),
                        ("8", "8 GB"),
                        ("4", "4 GB"),
                    ],
                ),
                // "Windows 11Pro" is the extractor's collapsed form of the
                // vendor's two-token edition name.
                table(
                    "os",
                    &[
                        ("Windows 11Pro", "Windows 11 Pro"),
                        ("Windows 11", "Windows 11"),
                        ("Windows 10 Pro", "Windows 10 Pro"),
                        ("Windows 10", "Windows 10"),
                        ("Windows 7", "Windows 7"),
                        ("Linux", "Linux"),
                    ],
                ),
                table(
                    "condition",
                    &[
                        ("Nowy", "Nowy"),
                        ("Bardzo dobry", "Bardzo dobry"),
                        ("Dobry", "Dobry"),
                        ("Używany", "Używany"),
                    ],
                ),
                table(
                    "graphic_card",
                    &[
                        ("RTX", "NVIDIA RTX"),
                        ("GTX", "NVIDIA GTX"),
                        ("Quadro", "NVIDIA Quadro"),
                        ("Radeon", "AMD Radeon"),
                        ("UHD", "Intel UHD"),
                        ("HD Graphics", "Intel HD"),
                    ],
                ),
            ],
        }
    }

    /// Map a raw field value to its canonical label. Absent input and raw
    /// values matching no trigger both land in the attribute's default bucket.
    pub fn normalize(&self, attribute: &str, raw: Option<&str>) -> String {
        let Some(rules) = self.attributes.iter().find(|a| a.attribute == attribute) else {
            return DEFAULT_LABEL.to_string();
        };
        let Some(raw) = raw else {
            return rules.default.clone();
        };
        let haystack = raw.to_lowercase();
        for rule in &rules.rules {
            if haystack.contains(&rule.trigger.to_lowercase()) {
                return rule.label.clone();
            }
        }
        rules.default.clone()
    }

    pub fn rules_for(&self, attribute: &str) -> Option<&AttributeRules> {
        self.attributes.iter().find(|a| a.attribute == attribute)
    }
}

fn table(attribute: &str, rules: &[(&str, &str)]) -> AttributeRules {
    AttributeRules {
        attribute: attribute.to_string(),
        rules: rules
            .iter()
            .map(|(t, l)| Rule {
                trigger: t.to_string(),
                label: l.to_string(),
            })
            .collect(),
        default: DEFAULT_LABEL.to_string(),
    }
}
