use std::collections::BTreeSet;
use std::ops::Range;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rust_decimal::Decimal;

use balcao_core::domain::context::{BudgetRange, ProjectContext, ProjectType, Urgency};
use balcao_core::text::normalize;

const STATES: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB", "PR",
    "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

const NAME_STOPWORDS: [&str; 22] = [
    "e", "eu", "quero", "queria", "gostaria", "preciso", "tenho", "sou", "moro", "aqui", "tudo",
    "bem", "estou", "to", "com", "para", "pra", "vou", "boa", "bom", "ola", "oi",
];

const NAME_CONNECTORS: [&str; 5] = ["da", "de", "do", "das", "dos"];

/// Canonical material name and the normalized phrases that mention it.
const MATERIALS: &[(&str, &[&str])] = &[
    ("painel solar", &["painel solar", "paineis solares", "placa solar", "placas solares", "modulo fotovoltaico", "modulos fotovoltaicos"]),
    ("inversor", &["inversor", "inversores", "microinversor"]),
    ("telha shingle", &["shingle", "telha shingle", "telhas shingle"]),
    ("osb", &["osb", "chapa osb", "placa osb"]),
    ("manta asfáltica", &["manta asfaltica", "mantas asfalticas"]),
    ("perfil metálico", &["perfil", "perfis", "montante", "montantes", "guia metalica"]),
    ("placa de gesso", &["placa de gesso", "placas de gesso", "gesso acartonado", "chapa de drywall"]),
    ("lã mineral", &["la mineral", "la de vidro", "la de rocha"]),
    ("forro pvc", &["forro pvc", "forro de pvc"]),
    ("forro de gesso", &["forro de gesso", "forro gesso"]),
    ("porcelanato", &["porcelanato", "porcelanatos"]),
    ("piso vinílico", &["piso vinilico", "vinilico"]),
    ("piso laminado", &["piso laminado", "laminado"]),
    ("argamassa", &["argamassa", "argamassas"]),
    ("rejunte", &["rejunte"]),
    ("cimento", &["cimento"]),
    ("impermeabilizante", &["impermeabilizante", "manta liquida", "membrana acrilica"]),
    ("furadeira", &["furadeira", "parafusadeira"]),
    ("serra", &["serra circular", "serra marmore", "esmerilhadeira"]),
];

static NAME_EXPLICIT: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i:\bmeu nome (?:é|e)|\bme chamo)\s+(\p{L}{2,}(?:\s+\p{L}{2,}){0,3})")
});
static NAME_INTRO: Lazy<Regex> = Lazy::new(|| {
    compile(r"\b(?i:sou o|sou a|aqui (?:é|e) o|aqui (?:é|e) a)\s+(\p{Lu}\p{Ll}+(?:\s+\p{L}+){0,3})")
});
static PHONE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?:\+?\b55[\s.-]?)?\(?\d{2}\)?[\s.-]?9?\d{4}[\s.-]?\d{4}\b")
});
static EMAIL: Lazy<Regex> =
    Lazy::new(|| compile(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"));
static CITY: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i:\bmoro em|\bsou de|\bfica em|\bobra (?:é |e )?em|\bcidade(?: de|:)|\bentrega(?:r)? em|\binstala(?:ção|cao|r) em|\baqui em)\s+(\p{Lu}\p{L}+(?:\s+(?:d[aeo]s?\s+)?\p{Lu}\p{L}+){0,3})(?:\s*[-/,]\s*([A-Z]{2})\b)?",
    )
});
static CITY_WITH_STATE: Lazy<Regex> = Lazy::new(|| {
    compile(r"\b(\p{Lu}\p{L}+(?:\s+(?:d[aeo]s?\s+)?\p{Lu}\p{L}+){0,3})\s*[-/]\s*([A-Z]{2})\b")
});
static BUDGET_RANGE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\bentre\s+(?:r\$\s*)?(\d[\d.]*(?:,\d{1,2})?)\s*(mil|k)?\s+(?:e|a)\s+(?:r\$\s*)?(\d[\d.]*(?:,\d{1,2})?)\s*(mil|k)?",
    )
});
static MONEY_SYMBOL: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)r\$\s*(\d[\d.]*(?:,\d{1,2})?)\s*(mil|k)?\b"));
static MONEY_SUFFIX: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b(\d+(?:[.,]\d+)?)\s*(mil|k)\b"));
static MONEY_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b(?:orçamento|orcamento|verba|budget|investir|investimento|gastar)\D{0,20}?(\d[\d.]*(?:,\d{1,2})?)\s*(mil|k)?",
    )
});
static AREA: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)(\d[\d.]*(?:,\d+)?)\s*(?:m²|m2|mts2|mt2|metros quadrados|metros²)")
});
static URGENCY: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"\b(?:(?P<low>sem pressa|sem urgencia|nao tenho pressa|so pesquisando|apenas pesquisando|so cotando|ano que vem|proximo ano|futuramente)|(?P<high>urgente|urgencia|imediato|imediatamente|hoje|amanha|o quanto antes|o mais rapido|essa semana|esta semana|pra ontem|para ontem)|(?P<medium>este mes|esse mes|mes que vem|proximo mes|proximas semanas|em breve|logo))\b",
    )
});
static PROJECT_TYPE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"\b(?:(?P<rural>rural|fazenda|sitio|chacara|granja|haras)|(?P<industrial>industria|industrial|fabrica|galpao)|(?P<comercial>comercial|loja|escritorio|empresa|restaurante|clinica|consultorio|hotel|pousada)|(?P<residencial>residencial|residencia|casa|apartamento|apto|sobrado|condominio))\b",
    )
});
static TIMELINE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"\b(?:(?:em|daqui a|dentro de|ate|nos proximos)\s+\d{1,3}\s+(?:dias?|semanas?|meses|mes|anos?)|ate (?:o fim d[eo] )?(?:janeiro|fevereiro|marco|abril|maio|junho|julho|agosto|setembro|outubro|novembro|dezembro|mes|ano)|(?:mes|semana|ano) que vem|proxim[oa] (?:mes|semana|ano))\b",
    )
});

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(error) => panic!("invalid built-in extraction pattern: {error}"),
    }
}

/// Pulls project attributes out of free customer text with a fixed battery of
/// regular expressions. The extractor is stateless: all memory lives in the
/// prior [`ProjectContext`] handed to [`ContextExtractor::extract`].
#[derive(Clone, Debug, Default)]
pub struct ContextExtractor;

impl ContextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Scans `text` and merges what it finds over `prior`. New values replace
    /// prior ones, fields not mentioned keep their prior value and materials
    /// accumulate.
    pub fn extract(&self, text: &str, prior: &ProjectContext) -> ProjectContext {
        merge(prior, self.scan(text))
    }

    /// Only the attributes present in `text`.
    pub fn scan(&self, text: &str) -> ProjectContext {
        let normalized = normalize(text);
        let (city, state) = extract_location(text);
        let (budget_range, range_span) = extract_budget_range(text);
        let budget_amount = extract_budget_amount(text, range_span);

        ProjectContext {
            customer_name: extract_name(text),
            phone: extract_phone(text),
            email: extract_email(text),
            city,
            state,
            budget_amount,
            budget_range,
            area_m2: extract_area(text),
            urgency: extract_urgency(&normalized),
            project_type: extract_project_type(&normalized),
            timeline: extract_timeline(&normalized),
            materials: extract_materials(&normalized),
        }
    }
}

fn merge(prior: &ProjectContext, found: ProjectContext) -> ProjectContext {
    let budget_range = found
        .budget_range
        .or_else(|| found.budget_amount.map(BudgetRange::bucket_for))
        .or_else(|| prior.budget_range.clone());

    let materials: BTreeSet<String> =
        prior.materials.iter().cloned().chain(found.materials).collect();

    ProjectContext {
        customer_name: found.customer_name.or_else(|| prior.customer_name.clone()),
        phone: found.phone.or_else(|| prior.phone.clone()),
        email: found.email.or_else(|| prior.email.clone()),
        // A new city without a state drops the state of the old city.
        state: match (&found.city, found.state) {
            (_, Some(state)) => Some(state),
            (Some(_), None) => None,
            (None, None) => prior.state.clone(),
        },
        city: found.city.or_else(|| prior.city.clone()),
        budget_amount: found.budget_amount.or(prior.budget_amount),
        budget_range,
        area_m2: found.area_m2.or(prior.area_m2),
        urgency: found.urgency.or(prior.urgency),
        project_type: found.project_type.or(prior.project_type),
        timeline: found.timeline.or_else(|| prior.timeline.clone()),
        materials: materials.into_iter().collect(),
    }
}

fn extract_name(text: &str) -> Option<String> {
    let explicit = NAME_EXPLICIT.captures_iter(text).last().and_then(|caps| name_from(&caps, false));
    explicit.or_else(|| NAME_INTRO.captures_iter(text).last().and_then(|caps| name_from(&caps, true)))
}

fn name_from(caps: &Captures<'_>, require_capitalized: bool) -> Option<String> {
    let words: Vec<&str> = caps.get(1)?.as_str().split_whitespace().collect();
    let mut name = Vec::new();

    for (index, word) in words.iter().enumerate() {
        let folded = normalize(word);
        if NAME_STOPWORDS.contains(&folded.as_str()) {
            break;
        }
        if NAME_CONNECTORS.contains(&folded.as_str()) {
            let next_is_name = words
                .get(index + 1)
                .and_then(|next| next.chars().next())
                .map(char::is_uppercase)
                .unwrap_or(false);
            if name.is_empty() || !next_is_name {
                break;
            }
            name.push(folded);
            continue;
        }
        let capitalized = word.chars().next().map(char::is_uppercase).unwrap_or(false);
        if require_capitalized && !capitalized {
            break;
        }
        name.push(title_case(word));
    }

    (!name.is_empty()).then(|| name.join(" "))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Brazilian numbers are normalized to digits with the `55` country code.
fn extract_phone(text: &str) -> Option<String> {
    PHONE.find_iter(text).filter_map(|found| normalize_phone(found.as_str())).last()
}

pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        10 | 11 => Some(format!("55{digits}")),
        12 | 13 if digits.starts_with("55") => Some(digits),
        _ => None,
    }
}

fn extract_email(text: &str) -> Option<String> {
    EMAIL.find_iter(text).last().map(|found| found.as_str().to_ascii_lowercase())
}

fn extract_location(text: &str) -> (Option<String>, Option<String>) {
    let caps = CITY.captures_iter(text).last().or_else(|| {
        CITY_WITH_STATE
            .captures_iter(text)
            .filter(|caps| caps.get(2).map(|uf| is_state(uf.as_str())).unwrap_or(false))
            .last()
    });

    let Some(caps) = caps else {
        return (None, None);
    };
    let city = caps.get(1).map(|city| city.as_str().trim().to_string());
    let state =
        caps.get(2).map(|uf| uf.as_str().to_string()).filter(|uf| is_state(uf.as_str()));
    (city, state)
}

fn is_state(value: &str) -> bool {
    STATES.contains(&value)
}

fn extract_budget_range(text: &str) -> (Option<BudgetRange>, Option<Range<usize>>) {
    for caps in BUDGET_RANGE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if is_area_unit_next(&text[whole.end()..]) {
            continue;
        }

        let upper_unit = caps.get(4).map(|unit| unit.as_str());
        let lower_unit = caps.get(2).map(|unit| unit.as_str()).or(upper_unit);
        let lower = caps.get(1).and_then(|value| parse_amount(value.as_str(), lower_unit));
        let upper = caps.get(3).and_then(|value| parse_amount(value.as_str(), upper_unit));

        if let (Some(lower), Some(upper)) = (lower, upper) {
            let (min, max) = if lower <= upper { (lower, upper) } else { (upper, lower) };
            return (Some(BudgetRange { min, max: Some(max) }), Some(whole.range()));
        }
    }
    (None, None)
}

fn is_area_unit_next(rest: &str) -> bool {
    let rest = normalize(rest.trim_start());
    rest.starts_with("m2") || rest.starts_with("m²") || rest.starts_with("metros")
}

fn extract_budget_amount(text: &str, skip: Option<Range<usize>>) -> Option<Decimal> {
    let overlaps = |range: &Range<usize>| {
        skip.as_ref().map(|skip| range.start < skip.end && skip.start < range.end).unwrap_or(false)
    };

    let mut hits: Vec<(usize, Decimal)> = Vec::new();
    for regex in [&*MONEY_SYMBOL, &*MONEY_SUFFIX, &*MONEY_CONTEXT] {
        for caps in regex.captures_iter(text) {
            let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if overlaps(&whole.range()) || is_area_unit_next(&text[whole.end()..]) {
                continue;
            }
            let unit = caps.get(2).map(|unit| unit.as_str());
            if let Some(amount) = parse_amount(value.as_str(), unit) {
                hits.push((whole.start(), amount));
            }
        }
    }

    hits.into_iter().filter(|(_, amount)| *amount > Decimal::ZERO).max_by_key(|(at, _)| *at).map(
        |(_, amount)| amount,
    )
}

/// Parses `15.000`, `15.000,50`, `1,5` or `2.5`, scaled by `mil`/`k`.
pub fn parse_amount(raw: &str, unit: Option<&str>) -> Option<Decimal> {
    let raw = raw.trim().trim_end_matches('.');
    let canonical = if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else if raw.rsplit('.').next().map(|tail| tail.len() == 3).unwrap_or(false)
        && raw.contains('.')
    {
        raw.replace('.', "")
    } else {
        raw.to_string()
    };

    let value = Decimal::from_str(&canonical).ok()?;
    let scaled = match unit.map(str::to_ascii_lowercase).as_deref() {
        Some("mil") | Some("k") => value * Decimal::new(1_000, 0),
        _ => value,
    };
    Some(scaled.normalize())
}

fn extract_area(text: &str) -> Option<Decimal> {
    AREA.captures_iter(text)
        .filter_map(|caps| caps.get(1).and_then(|value| parse_amount(value.as_str(), None)))
        .filter(|area| *area > Decimal::ZERO)
        .last()
}

fn extract_urgency(normalized: &str) -> Option<Urgency> {
    let caps = URGENCY.captures_iter(normalized).last()?;
    if caps.name("high").is_some() {
        Some(Urgency::High)
    } else if caps.name("medium").is_some() {
        Some(Urgency::Medium)
    } else {
        Some(Urgency::Low)
    }
}

fn extract_project_type(normalized: &str) -> Option<ProjectType> {
    let caps = PROJECT_TYPE.captures_iter(normalized).last()?;
    if caps.name("rural").is_some() {
        Some(ProjectType::Rural)
    } else if caps.name("industrial").is_some() {
        Some(ProjectType::Industrial)
    } else if caps.name("comercial").is_some() {
        Some(ProjectType::Comercial)
    } else {
        Some(ProjectType::Residencial)
    }
}

fn extract_timeline(normalized: &str) -> Option<String> {
    TIMELINE.find_iter(normalized).last().map(|found| found.as_str().to_string())
}

fn extract_materials(normalized: &str) -> Vec<String> {
    let found: BTreeSet<String> = MATERIALS
        .iter()
        .filter(|(_, phrases)| {
            phrases.iter().any(|phrase| balcao_core::text::contains_word(normalized, phrase))
        })
        .map(|(name, _)| (*name).to_string())
        .collect();
    found.into_iter().collect()
}
