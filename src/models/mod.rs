// models/mod.rs
pub mod billing;
pub mod organisation;
pub mod proposition;
pub mod suggestion;
pub mod template;

pub use billing::{credits_accordes, pourcentage_bonus, StatutTransaction, StripeTransaction};
pub use organisation::Organisation;
pub use proposition::{Proposition, StatutProposition};
pub use suggestion::{Suggestion, SuggestionsGenerees, Synthese};
pub use template::{
    Delimiteurs, ExcelConfig, FileConfig, FileType, PdfConfig, PropositionTemplate,
    StatutTemplate, TableauDynamique, WordConfig, TEMPLATES_MAX_PAR_ORGANISATION,
};

use serde::{Deserialize, Serialize};

/// Réponse paginée générique
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}
