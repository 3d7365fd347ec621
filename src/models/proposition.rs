use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::suggestion::{Suggestion, SuggestionsGenerees};
use crate::utils::error::{AppError, Result};

/// État d'une proposition
///
/// L'état est un champ explicite, jamais déduit de la présence de champs
/// nullables. Les transitions passent par `transitionner`, qui rejette tout
/// passage hors de la table validée.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "statut_proposition", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StatutProposition {
    Draft,       // Créée, librement modifiable
    Processing,  // Extraction en cours
    Ready,       // Données présentes, générable
    Exported,    // Artefact produit et persisté
    Error,       // Échec, regénérable
}

impl StatutProposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatutProposition::Draft => "draft",
            StatutProposition::Processing => "processing",
            StatutProposition::Ready => "ready",
            StatutProposition::Exported => "exported",
            StatutProposition::Error => "error",
        }
    }

    /// Table de transitions validée
    ///
    /// `error -> processing` est la voie de relance de `generate` ;
    /// `exported -> exported` couvre le ré-export assumé d'une proposition
    /// déjà exportée. Tout état peut basculer en `error`.
    pub fn peut_transitionner(&self, vers: StatutProposition) -> bool {
        use StatutProposition::*;

        matches!(
            (self, vers),
            (Draft, Processing)
                | (Processing, Ready)
                | (Ready, Exported)
                | (Error, Processing)
                | (Exported, Exported)
                | (_, Error)
        )
    }
}

/// Une proposition commerciale
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Proposition {
    /// ID unique
    pub id: Uuid,

    /// Organisation propriétaire
    pub organisation_id: Uuid,

    /// Template utilisé pour la génération
    pub template_id: Option<Uuid>,

    /// Nom du client destinataire
    pub nom_client: Option<String>,

    /// Documents sources uploadés, dans l'ordre
    pub source_documents: sqlx::types::Json<Vec<String>>,

    /// Sortie brute du collaborateur d'extraction
    pub extracted_data: Option<Value>,

    /// Données éditées par l'utilisateur, prioritaires à la génération
    pub filled_data: Option<Value>,

    /// État courant
    pub statut: StatutProposition,

    /// Emplacement de l'artefact généré
    pub duplicated_template_url: Option<String>,

    /// Suggestions machine d'origine (référence pour la dérive)
    pub suggestions_generees: Option<sqlx::types::Json<SuggestionsGenerees>>,

    /// Suggestions après édition humaine
    pub suggestions_editees: Option<sqlx::types::Json<Vec<Suggestion>>>,

    /// Synthèse après édition humaine
    pub synthese_editee: Option<String>,

    /// Message d'erreur du dernier échec de génération
    pub erreur: Option<String>,

    /// Date de création
    pub created_at: DateTime<Utc>,

    /// Date de mise à jour
    pub updated_at: DateTime<Utc>,
}

impl Proposition {
    /// Crée un brouillon minimal
    pub fn new(
        organisation_id: Uuid,
        template_id: Option<Uuid>,
        nom_client: Option<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            organisation_id,
            template_id,
            nom_client,
            source_documents: sqlx::types::Json(Vec::new()),
            extracted_data: None,
            filled_data: None,
            statut: StatutProposition::Draft,
            duplicated_template_url: None,
            suggestions_generees: None,
            suggestions_editees: None,
            synthese_editee: None,
            erreur: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applique une transition validée
    pub fn transitionner(&mut self, vers: StatutProposition) -> Result<()> {
        if !self.statut.peut_transitionner(vers) {
            return Err(AppError::InvalidTransition {
                de: self.statut.as_str().to_string(),
                vers: vers.as_str().to_string(),
            });
        }

        self.statut = vers;
        self.updated_at = Utc::now();

        if vers != StatutProposition::Error {
            self.erreur = None;
        }

        Ok(())
    }

    /// Données utilisées pour la génération : l'édition humaine prime
    pub fn donnees_generation(&self) -> Option<&Value> {
        self.filled_data.as_ref().or(self.extracted_data.as_ref())
    }

    /// Suggestions courantes : l'édition humaine prime
    pub fn suggestions_courantes(&self) -> Option<&[Suggestion]> {
        if let Some(editees) = &self.suggestions_editees {
            return Some(&editees.0);
        }
        self.suggestions_generees
            .as_ref()
            .map(|g| g.0.suggestions.as_slice())
    }

    /// Vrai si au moins un champ mappé est non vide : condition d'entrée
    /// de l'état `ready`. Sans mapping connu, le record brut fait foi.
    pub fn a_un_champ_renseigne(&self, cles_mappees: Option<&[&str]>) -> bool {
        let Some(donnees) = self.donnees_generation() else {
            return false;
        };

        let Some(objet) = donnees.as_object() else {
            return false;
        };

        let non_vide = |v: &Value| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        };

        match cles_mappees {
            Some(cles) => cles
                .iter()
                .any(|cle| objet.get(*cle).map(non_vide).unwrap_or(false)),
            None => objet.values().any(non_vide),
        }
    }

    /// Enregistre un échec de génération
    pub fn echouer(&mut self, erreur: String) {
        // *->error est toujours permis par la table
        self.statut = StatutProposition::Error;
        self.erreur = Some(erreur);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proposition() -> Proposition {
        Proposition::new(Uuid::new_v4(), None, Some("Acme".to_string()))
    }

    #[test]
    fn cycle_nominal() {
        let mut p = proposition();
        assert_eq!(p.statut, StatutProposition::Draft);

        p.transitionner(StatutProposition::Processing).unwrap();
        p.transitionner(StatutProposition::Ready).unwrap();
        p.transitionner(StatutProposition::Exported).unwrap();
        assert_eq!(p.statut, StatutProposition::Exported);
    }

    #[test]
    fn transitions_interdites() {
        let mut p = proposition();

        // draft -> ready : l'extraction n'est pas passée
        let err = p.transitionner(StatutProposition::Ready).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        // draft -> exported : rien n'a été généré
        assert!(p.transitionner(StatutProposition::Exported).is_err());

        // exported -> draft : pas de retour en arrière
        p.statut = StatutProposition::Exported;
        assert!(p.transitionner(StatutProposition::Draft).is_err());
    }

    #[test]
    fn erreur_accessible_depuis_tout_etat() {
        for statut in [
            StatutProposition::Draft,
            StatutProposition::Processing,
            StatutProposition::Ready,
            StatutProposition::Exported,
        ] {
            let mut p = proposition();
            p.statut = statut;
            p.transitionner(StatutProposition::Error).unwrap();
        }
    }

    #[test]
    fn relance_depuis_erreur() {
        let mut p = proposition();
        p.echouer("extraction timeout".to_string());
        assert_eq!(p.statut, StatutProposition::Error);
        assert!(p.erreur.is_some());

        p.transitionner(StatutProposition::Processing).unwrap();
        assert!(p.erreur.is_none());
    }

    #[test]
    fn reexport_idempotent() {
        let mut p = proposition();
        p.statut = StatutProposition::Exported;
        p.transitionner(StatutProposition::Exported).unwrap();
    }

    #[test]
    fn donnees_editees_prioritaires() {
        let mut p = proposition();
        p.extracted_data = Some(json!({"client_name": "extrait"}));
        assert_eq!(
            p.donnees_generation().unwrap()["client_name"],
            json!("extrait")
        );

        p.filled_data = Some(json!({"client_name": "corrigé"}));
        assert_eq!(
            p.donnees_generation().unwrap()["client_name"],
            json!("corrigé")
        );
    }

    #[test]
    fn readiness_exige_un_champ_mappe_non_vide() {
        let mut p = proposition();
        assert!(!p.a_un_champ_renseigne(None));

        p.extracted_data = Some(json!({"client_name": "", "total": null}));
        assert!(!p.a_un_champ_renseigne(Some(&["client_name", "total"])));

        p.extracted_data = Some(json!({"client_name": "Acme"}));
        assert!(p.a_un_champ_renseigne(Some(&["client_name", "total"])));

        // champ renseigné mais hors mapping : pas suffisant
        p.extracted_data = Some(json!({"autre": "x"}));
        assert!(!p.a_un_champ_renseigne(Some(&["client_name"])));
    }
}
