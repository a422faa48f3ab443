use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::category::ProductCategory;
use crate::text::{contains_word, normalize};

pub const EXACT_MATCH_WEIGHT: u32 = 3;
pub const WORD_MATCH_WEIGHT: u32 = 2;
pub const SUBSTRING_MATCH_WEIGHT: u32 = 1;
pub const RETAINED_CONFIDENCE: f32 = 0.35;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: ProductCategory,
    pub confidence: f32,
    pub matched_keywords: Vec<String>,
    pub retained_previous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassificationResult {
    /// Result used whenever classification could not run at all.
    pub fn fallback(error: impl Into<String>) -> Self {
        Self {
            category: ProductCategory::Indefinido,
            confidence: 0.0,
            matched_keywords: Vec::new(),
            retained_previous: false,
            error: Some(error.into()),
        }
    }

    fn unmatched(current: Option<ProductCategory>) -> Self {
        match current.filter(ProductCategory::is_defined) {
            Some(category) => Self {
                category,
                confidence: RETAINED_CONFIDENCE,
                matched_keywords: Vec::new(),
                retained_previous: true,
                error: None,
            },
            None => Self {
                category: ProductCategory::Indefinido,
                confidence: 0.0,
                matched_keywords: Vec::new(),
                retained_previous: false,
                error: None,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum KeywordTableError {
    #[error("could not read keyword table `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse keyword table `{path}`: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("keyword table cannot map keywords to `indefinido`")]
    UndefinedCategory,
    #[error("keyword table is empty")]
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryKeywords {
    pub category: ProductCategory,
    pub keywords: Vec<String>,
}

/// Ordered per-category keyword lists. Order decides ties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub categories: Vec<CategoryKeywords>,
}

impl KeywordTable {
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, KeywordTableError> {
        let table = toml::from_str::<KeywordTable>(raw)
            .map_err(|source| KeywordTableError::Parse { path: path.to_path_buf(), source })?;
        table.normalized()
    }

    pub fn load(path: &Path) -> Result<Self, KeywordTableError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| KeywordTableError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw, path)
    }

    fn normalized(self) -> Result<Self, KeywordTableError> {
        let mut categories = Vec::with_capacity(self.categories.len());
        for entry in self.categories {
            if !entry.category.is_defined() {
                return Err(KeywordTableError::UndefinedCategory);
            }
            let mut seen = BTreeSet::new();
            let keywords: Vec<String> = entry
                .keywords
                .iter()
                .map(|keyword| normalize(keyword.trim()))
                .filter(|keyword| !keyword.is_empty() && seen.insert(keyword.clone()))
                .collect();
            if !keywords.is_empty() {
                categories.push(CategoryKeywords { category: entry.category, keywords });
            }
        }

        if categories.is_empty() {
            return Err(KeywordTableError::Empty);
        }
        Ok(Self { categories })
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        let entry = |category, keywords: &[&str]| CategoryKeywords {
            category,
            keywords: keywords.iter().map(|keyword| normalize(keyword)).collect(),
        };

        Self {
            categories: vec![
                entry(
                    ProductCategory::EnergiaSolar,
                    &[
                        "energia solar",
                        "painel solar",
                        "placa solar",
                        "placas solares",
                        "fotovoltaico",
                        "fotovoltaica",
                        "inversor",
                        "conta de luz",
                        "kwh",
                        "solar",
                    ],
                ),
                entry(
                    ProductCategory::TelhaShingle,
                    &["telha shingle", "shingle", "telhado", "telha", "cobertura", "manta asfáltica"],
                ),
                entry(
                    ProductCategory::SteelFrame,
                    &["steel frame", "steelframe", "light steel", "construção a seco", "perfil metálico", "osb"],
                ),
                entry(
                    ProductCategory::DrywallDivisorias,
                    &["drywall", "divisória", "divisorias", "parede de gesso", "placa de gesso", "gesso acartonado"],
                ),
                entry(
                    ProductCategory::Forros,
                    &["forro", "forro pvc", "forro de gesso", "forro mineral", "rebaixamento", "teto"],
                ),
                entry(
                    ProductCategory::PisosRevestimentos,
                    &["piso", "pisos", "porcelanato", "revestimento", "cerâmica", "laminado", "vinílico", "azulejo"],
                ),
                entry(
                    ProductCategory::Ferramentas,
                    &["ferramenta", "ferramentas", "furadeira", "parafusadeira", "serra", "esmerilhadeira", "martelo", "nível a laser"],
                ),
                entry(
                    ProductCategory::Impermeabilizacao,
                    &["impermeabilização", "impermeabilizante", "infiltração", "vazamento", "umidade", "manta líquida", "goteira"],
                ),
            ],
        }
    }
}

/// Scores free text against an ordered keyword table.
#[derive(Clone, Debug, Default)]
pub struct KeywordClassifier {
    table: KeywordTable,
}

impl KeywordClassifier {
    pub fn new(table: KeywordTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    pub fn classify(&self, text: &str, current: Option<ProductCategory>) -> ClassificationResult {
        let normalized = normalize(text.trim());
        if normalized.is_empty() {
            return ClassificationResult::unmatched(current);
        }

        let mut best: Option<(ProductCategory, u32, Vec<String>)> = None;
        let mut total = 0u32;

        for entry in &self.table.categories {
            let mut score = 0u32;
            let mut matched = Vec::new();
            for keyword in &entry.keywords {
                let weight = keyword_weight(&normalized, keyword);
                if weight > 0 {
                    score += weight;
                    matched.push(keyword.clone());
                }
            }
            total += score;

            let better = match &best {
                Some((_, best_score, _)) => score > *best_score,
                None => score > 0,
            };
            if better {
                best = Some((entry.category, score, matched));
            }
        }

        match best {
            Some((category, score, matched_keywords)) => {
                let share = score as f32 / total as f32;
                let strength = (score as f32 / EXACT_MATCH_WEIGHT as f32).min(1.0);
                ClassificationResult {
                    category,
                    confidence: share * strength,
                    matched_keywords,
                    retained_previous: false,
                    error: None,
                }
            }
            None => ClassificationResult::unmatched(current),
        }
    }
}

fn keyword_weight(normalized_text: &str, keyword: &str) -> u32 {
    if normalized_text == keyword {
        EXACT_MATCH_WEIGHT
    } else if contains_word(normalized_text, keyword) {
        WORD_MATCH_WEIGHT
    } else if normalized_text.contains(keyword) {
        SUBSTRING_MATCH_WEIGHT
    } else {
        0
    }
}
