use once_cell::sync::Lazy;
use regex::Regex;

use balcao_core::domain::category::ProductCategory;
use balcao_core::domain::context::ProjectContext;
use balcao_core::text::normalize;

/// Sent whenever the pipeline fails outright; the conversation is handed to a human.
pub const APOLOGY: &str = "Desculpe, tivemos um problema para responder agora. \
Um de nossos consultores vai continuar o seu atendimento em instantes.";

pub const HANDOFF_NOTICE: &str =
    "Vou passar a nossa conversa para um consultor da equipe, que continua o atendimento por aqui.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CannedReply {
    pub text: String,
    pub quick_replies: Vec<String>,
}

impl CannedReply {
    fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), quick_replies: Vec::new() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    Price,
    HowItWorks,
    Installation,
    Delivery,
    Financing,
    Technical,
    Greeting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingField {
    Area,
    City,
    Budget,
}

/// Checked in order; the first topic whose pattern matches wins.
static TOPICS: Lazy<Vec<(Topic, Regex)>> = Lazy::new(|| {
    [
        (Topic::Price, r"\b(?:preco|precos|valor|valores|quanto custa|quanto fica|quanto sai|orcamento|cotacao|custo)\b"),
        (Topic::HowItWorks, r"\b(?:como funciona|funciona|vantagens?|beneficios?|vale a pena|diferenca)\b"),
        (Topic::Installation, r"\b(?:instalacao|instalar|instala|instalam|mao de obra|montagem|montar|aplicacao|aplicar)\b"),
        (Topic::Delivery, r"\b(?:entrega|entregam|entregar|frete|retirada|retirar|envio)\b"),
        (Topic::Financing, r"\b(?:financiamento|financiar|parcela|parcelas|parcelar|parcelado|cartao|boleto|pix|pagamento)\b"),
        (Topic::Technical, r"\b(?:especificacao|especificacoes|tecnico|tecnica|espessura|medida|medidas|garantia|norma|potencia|kwp|peso|resistencia)\b"),
        (Topic::Greeting, r"^\W*(?:oi|ola|bom dia|boa tarde|boa noite|e ai|opa)\b"),
    ]
    .into_iter()
    .filter_map(|(topic, pattern)| Regex::new(pattern).ok().map(|regex| (topic, regex)))
    .collect()
});

pub fn detect_topic(message: &str) -> Option<Topic> {
    let normalized = normalize(message);
    TOPICS.iter().find(|(_, regex)| regex.is_match(&normalized)).map(|(topic, _)| *topic)
}

/// The most valuable context field still missing for this category.
pub fn next_missing_field(category: ProductCategory, context: &ProjectContext) -> Option<MissingField> {
    let needs_area = !matches!(category, ProductCategory::Ferramentas | ProductCategory::EnergiaSolar);
    if needs_area && context.area_m2.is_none() {
        return Some(MissingField::Area);
    }
    if context.city.is_none() {
        return Some(MissingField::City);
    }
    if !context.has_budget() {
        return Some(MissingField::Budget);
    }
    None
}

fn question_for(field: MissingField) -> CannedReply {
    match field {
        MissingField::Area => CannedReply {
            text: "Qual é a metragem aproximada da área, em m²?".to_string(),
            quick_replies: vec!["Até 50 m²".into(), "Entre 50 e 150 m²".into(), "Acima de 150 m²".into()],
        },
        MissingField::City => CannedReply::new("Em qual cidade fica a obra?"),
        MissingField::Budget => CannedReply {
            text: "Você já tem uma ideia de orçamento para o projeto?".to_string(),
            quick_replies: vec!["Até 5 mil".into(), "Entre 5 e 15 mil".into(), "Acima de 15 mil".into()],
        },
    }
}

fn how_it_works(category: ProductCategory) -> &'static str {
    match category {
        ProductCategory::EnergiaSolar => "O sistema fotovoltaico transforma a luz do sol em energia elétrica. \
O inversor conecta os painéis à rede e o excedente vira crédito na sua conta de luz.",
        ProductCategory::TelhaShingle => "A telha shingle é uma manta asfáltica fixada sobre chapas de OSB. \
É leve, vence inclinações a partir de 15% e dá um acabamento bonito ao telhado.",
        ProductCategory::SteelFrame => "No steel frame a estrutura é feita com perfis de aço galvanizado e fechamentos em placas. \
A obra é seca, limpa e bem mais rápida que a alvenaria.",
        ProductCategory::DrywallDivisorias => "O drywall usa placas de gesso parafusadas em perfis metálicos. \
Você cria paredes e divisórias sem quebra-quebra, com opção de isolamento acústico.",
        ProductCategory::Forros => "Trabalhamos com forros de gesso, PVC e mineral. \
Eles escondem a fiação, permitem iluminação embutida e melhoram o acabamento do ambiente.",
        ProductCategory::PisosRevestimentos => "Temos porcelanatos, cerâmicas, laminados e vinílicos. \
A escolha depende do ambiente, do tráfego e do estilo que você procura.",
        ProductCategory::Ferramentas => "Temos ferramentas elétricas e manuais das principais marcas, \
para uso profissional ou doméstico.",
        ProductCategory::Impermeabilizacao => "A impermeabilização cria uma barreira contra a água com mantas ou produtos líquidos. \
O sistema certo depende do local e do tipo de superfície.",
        ProductCategory::Indefinido => "",
    }
}

fn technical(category: ProductCategory) -> &'static str {
    match category {
        ProductCategory::EnergiaSolar => "Os kits vão de 3 a 10 kWp, com painéis de 25 anos de garantia de performance. \
Para dimensionar, preciso do valor médio da sua conta de luz.",
        ProductCategory::TelhaShingle => "A shingle pesa cerca de 12 kg/m² e exige OSB de 11,1 mm com subcobertura. \
Tem garantia de fábrica de até 30 anos.",
        ProductCategory::SteelFrame => "Usamos perfis galvanizados Z275 de 90 ou 140 mm, \
com fechamento em OSB, placa cimentícia ou gesso.",
        ProductCategory::DrywallDivisorias => "As placas têm 12,5 mm nas versões standard, RU (umidade) e RF (fogo). \
Os perfis podem ser de 48, 70 ou 90 mm.",
        ProductCategory::Forros => "O forro de gesso usa placas de 12,5 mm e o de PVC réguas de 8 a 10 mm. \
O forro mineral é modular, em placas de 625 x 625 mm.",
        ProductCategory::PisosRevestimentos => "Informamos PEI, absorção e retificação de cada peça. \
Para áreas externas indicamos acabamento antiderrapante.",
        ProductCategory::Ferramentas => "Todas as ferramentas têm garantia do fabricante e vendemos modelos 127 V e 220 V.",
        ProductCategory::Impermeabilizacao => "Trabalhamos com manta asfáltica de 3 e 4 mm, manta líquida e argamassa polimérica, \
conforme a NBR 9575.",
        ProductCategory::Indefinido => "",
    }
}

/// Rule-based replies used when no LLM agent is available for the category.
#[derive(Clone, Debug, Default)]
pub struct TemplateResponder;

impl TemplateResponder {
    pub fn new() -> Self {
        Self
    }

    pub fn respond(
        &self,
        category: ProductCategory,
        latest_message: &str,
        context: &ProjectContext,
    ) -> CannedReply {
        if !category.is_defined() {
            return category_menu(detect_topic(latest_message) == Some(Topic::Greeting));
        }

        let name = category.display_name();
        let missing = next_missing_field(category, context);

        let lead = match detect_topic(latest_message) {
            Some(Topic::Price) => match missing {
                Some(_) => format!(
                    "Para montar o orçamento de {name} com preço certo, preciso de alguns dados do seu projeto."
                ),
                None => format!(
                    "Já tenho os dados principais do seu projeto de {name}. \
Um consultor vai preparar o orçamento e te enviar por aqui."
                ),
            },
            Some(Topic::HowItWorks) => how_it_works(category).to_string(),
            Some(Topic::Installation) => format!(
                "Indicamos instaladores parceiros para {name} e acompanhamos a obra do início ao fim."
            ),
            Some(Topic::Delivery) => "Entregamos em toda a região em até 5 dias úteis, \
e a retirada na loja pode ser feita no mesmo dia."
                .to_string(),
            Some(Topic::Financing) => "Parcelamos em até 12x no cartão, com desconto à vista no Pix, \
e temos linhas de financiamento para projetos maiores."
                .to_string(),
            Some(Topic::Technical) => technical(category).to_string(),
            Some(Topic::Greeting) | None => {
                format!("Que bom que você tem interesse em {name}! Vou te ajudar com isso.")
            }
        };

        match missing {
            Some(field) => {
                let question = question_for(field);
                CannedReply {
                    text: format!("{lead}\n\n{}", question.text),
                    quick_replies: question.quick_replies,
                }
            }
            None => CannedReply {
                text: lead,
                quick_replies: vec!["Falar com consultor".into(), "Tenho outra dúvida".into()],
            },
        }
    }
}

fn category_menu(greeting: bool) -> CannedReply {
    let opening = if greeting {
        "Olá! Seja bem-vindo. Com qual destes produtos podemos te ajudar?"
    } else {
        "Para te atender melhor, me conta: qual destes produtos você procura?"
    };
    CannedReply {
        text: opening.to_string(),
        quick_replies: ProductCategory::ALL
            .iter()
            .filter(|category| category.is_defined())
            .map(|category| category.display_name().to_string())
            .collect(),
    }
}

/// Maps a bare "2" or "2." to the second option offered in the previous reply.
pub fn resolve_numbered_choice(message: &str, offered: &[String]) -> Option<String> {
    let index: usize = message.trim().trim_end_matches(['.', ')']).parse().ok()?;
    index.checked_sub(1).and_then(|index| offered.get(index)).cloned()
}
