// core/generation_service.rs
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::extraction::Extractor;
use crate::core::filler::filler_pour;
use crate::core::ledger_service::LedgerService;
use crate::core::retention_service::RetentionService;
use crate::core::suggestion_tracker::{evaluer_drift, EtatModifications};
use crate::models::{Proposition, PropositionTemplate, StatutProposition, Suggestion};
use crate::services::database::Database;
use crate::services::storage::Storage;
use crate::utils::error::{AppError, Result};

/// Gabarit de prompt transmis au collaborateur d'extraction
const PROMPT_EXTRACTION: &str =
    "Extraire les champs suivants des documents fournis: {champs}. \
     Répondre en JSON plat, une clé par champ, null si introuvable.";

/// Résultat d'une génération
#[derive(Debug, Clone, serde::Serialize)]
pub struct GenerationResult {
    pub file_url: String,
}

/// Mise à jour partielle d'une proposition
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MajProposition {
    pub nom_client: Option<String>,
    pub template_id: Option<Uuid>,
    pub source_documents: Option<Vec<String>>,
    pub filled_data: Option<Value>,
    pub suggestions_editees: Option<Vec<Suggestion>>,
    pub synthese_editee: Option<String>,
}

/// Pipeline de génération et cycle de vie des propositions
///
/// Point d'entrée `generate` : résolution du mapping, moteur du format,
/// persistance de l'artefact, transition d'état optimiste, débit unique.
pub struct GenerationService {
    db: Arc<Database>,
    storage: Arc<Storage>,
    ledger: Arc<LedgerService>,
    retention: Arc<RetentionService>,
    extractor: Arc<dyn Extractor>,
    propositions_conservees: i64,
    generation_timeout: Duration,
    extraction_model: String,
}

impl GenerationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        storage: Arc<Storage>,
        ledger: Arc<LedgerService>,
        retention: Arc<RetentionService>,
        extractor: Arc<dyn Extractor>,
        propositions_conservees: i64,
        generation_timeout_seconds: u64,
        extraction_model: String,
    ) -> Self {
        Self {
            db,
            storage,
            ledger,
            retention,
            extractor,
            propositions_conservees,
            generation_timeout: Duration::from_secs(generation_timeout_seconds),
            extraction_model,
        }
    }

    /// Crée un brouillon minimal
    ///
    /// La rétention est appliquée avant l'insertion : l'historique reste
    /// borné sans planificateur. Son échec ne bloque pas la création.
    pub async fn create_draft(
        &self,
        organisation_id: Uuid,
        template_id: Option<Uuid>,
        nom_client: Option<String>,
    ) -> Result<Proposition> {
        self.db.get_organisation(organisation_id).await?;

        if let Err(e) = self
            .retention
            .enforce_retention(organisation_id, self.propositions_conservees)
            .await
        {
            warn!("Rétention échouée, création non bloquée: {}", e);
        }

        if let Some(template_id) = template_id {
            let template = self.db.get_template(template_id).await?;
            if !template.est_global() && template.organisation_id != Some(organisation_id) {
                return Err(AppError::NotFound("Template".to_string()));
            }
        }

        self.db
            .create_proposition(&Proposition::new(organisation_id, template_id, nom_client))
            .await
    }

    /// Applique une mise à jour partielle
    ///
    /// Fournir des données fait avancer l'état : un brouillon qui reçoit un
    /// record passe en `processing`, puis `ready` dès qu'au moins un champ
    /// mappé est renseigné.
    pub async fn update_proposition(
        &self,
        id: Uuid,
        maj: MajProposition,
    ) -> Result<Proposition> {
        let mut proposition = self.db.get_proposition(id).await?;

        if let Some(nom_client) = maj.nom_client {
            proposition.nom_client = Some(nom_client);
        }
        if let Some(template_id) = maj.template_id {
            proposition.template_id = Some(template_id);
        }
        if let Some(sources) = maj.source_documents {
            proposition.source_documents = sqlx::types::Json(sources);
        }
        if let Some(donnees) = maj.filled_data {
            proposition.filled_data = Some(donnees);
        }
        if let Some(suggestions) = maj.suggestions_editees {
            proposition.suggestions_editees = Some(sqlx::types::Json(suggestions));
        }
        if let Some(synthese) = maj.synthese_editee {
            proposition.synthese_editee = Some(synthese);
        }

        let cles = self.cles_template(&proposition).await?;
        let refs: Option<Vec<&str>> = cles
            .as_ref()
            .map(|v| v.iter().map(String::as_str).collect());

        if proposition.statut == StatutProposition::Draft
            && proposition.donnees_generation().is_some()
        {
            proposition.transitionner(StatutProposition::Processing)?;
        }
        if proposition.statut == StatutProposition::Processing
            && proposition.a_un_champ_renseigne(refs.as_deref())
        {
            proposition.transitionner(StatutProposition::Ready)?;
        }

        self.db.update_proposition(&proposition).await
    }

    /// Lance l'extraction sur les documents sources
    ///
    /// Échec du collaborateur : la proposition passe en `error` et reste
    /// relançable en rappelant cette opération ou `generate`.
    pub async fn lancer_extraction(&self, id: Uuid) -> Result<Proposition> {
        let mut proposition = self.db.get_proposition(id).await?;

        proposition.transitionner(StatutProposition::Processing)?;
        let mut proposition = self.db.update_proposition(&proposition).await?;

        let cles = self
            .cles_template(&proposition)
            .await?
            .unwrap_or_default();

        let resultat = self
            .extractor
            .extract(
                &proposition.source_documents.0,
                &cles,
                PROMPT_EXTRACTION,
                &self.extraction_model,
            )
            .await;

        match resultat {
            Ok(donnees) => {
                proposition.extracted_data = Some(Value::Object(donnees));

                let refs: Vec<&str> = cles.iter().map(String::as_str).collect();
                let mapping = if refs.is_empty() { None } else { Some(refs.as_slice()) };
                if proposition.a_un_champ_renseigne(mapping) {
                    proposition.transitionner(StatutProposition::Ready)?;
                }

                self.db.update_proposition(&proposition).await
            }
            Err(e) => {
                self.db.marquer_proposition_erreur(id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Point d'entrée du pipeline complet, borné dans le temps
    pub async fn generate(&self, id: Uuid) -> Result<GenerationResult> {
        match tokio::time::timeout(self.generation_timeout, self.generer(id)).await {
            Ok(resultat) => resultat,
            Err(_) => {
                self.db
                    .marquer_proposition_erreur(id, "délai de génération dépassé")
                    .await?;
                Err(AppError::Generation {
                    message: "La génération a dépassé le délai imparti".to_string(),
                    details: format!("timeout après {:?}", self.generation_timeout),
                })
            }
        }
    }

    async fn generer(&self, id: Uuid) -> Result<GenerationResult> {
        let proposition = self.db.get_proposition(id).await?;
        let statut_initial = proposition.statut;

        // Générable depuis ready (nominal), exported (ré-export assumé) et
        // error (relance) ; pas depuis draft ni processing.
        if !matches!(
            statut_initial,
            StatutProposition::Ready | StatutProposition::Exported | StatutProposition::Error
        ) {
            return Err(AppError::InvalidTransition {
                de: statut_initial.as_str().to_string(),
                vers: StatutProposition::Exported.as_str().to_string(),
            });
        }

        let template_id = proposition.template_id.ok_or_else(|| {
            AppError::Validation("proposition sans template associé".to_string())
        })?;
        let template = self.db.get_template(template_id).await?;

        // Une config Excel n'a pas de sens face à un gabarit Word : rejet
        // avant toute lecture du binaire.
        if !template.file_config.0.correspond(template.file_type) {
            return Err(AppError::ConfigMismatch {
                attendu: template.file_type.as_str().to_string(),
                recu: template.file_config.0.file_type().as_str().to_string(),
            });
        }

        let donnees = proposition
            .donnees_generation()
            .and_then(|d| d.as_object())
            .cloned()
            .ok_or_else(|| {
                AppError::Validation("proposition sans données de génération".to_string())
            })?;

        // Garde consultative avant export : une dérive non synchronisée est
        // signalée, jamais bloquante.
        if let (Some(generees), Some(courantes)) = (
            &proposition.suggestions_generees,
            &proposition.suggestions_editees,
        ) {
            let etat = evaluer_drift(
                &generees.0,
                &courantes.0,
                proposition.synthese_editee.as_deref(),
            );
            if etat.needs_warning() {
                warn!(
                    "Proposition {}: {} produit(s) modifié(s) sans justification mise à jour",
                    id, etat.produits_sans_nouvelle_justification
                );
            }
        }

        // Relance : error -> processing -> ready par la table validée
        if statut_initial == StatutProposition::Error {
            self.db
                .transition_proposition(id, StatutProposition::Error, StatutProposition::Processing)
                .await?;
            self.db
                .transition_proposition(id, StatutProposition::Processing, StatutProposition::Ready)
                .await?;
        }

        // Le gabarit est une entrée immuable : le moteur ne touche jamais
        // au stockage, la persistance du rendu appartient à ce service.
        let gabarit = match self.storage.download(&template.fichier_url).await {
            Ok(binaire) => binaire,
            Err(e) => {
                self.db.marquer_proposition_erreur(id, &e.to_string()).await?;
                return Err(e);
            }
        };

        let filler = filler_pour(&template.file_config.0);
        let rendu = tokio::task::spawn_blocking(move || filler.fill(&gabarit, &donnees))
            .await
            .map_err(|e| AppError::Generation {
                message: "La génération a échoué".to_string(),
                details: e.to_string(),
            })?;

        let rendu = match rendu {
            Ok(rendu) => rendu,
            Err(e) => {
                let erreur: AppError = e.into();
                self.db.marquer_proposition_erreur(id, &erreur.to_string()).await?;
                return Err(erreur);
            }
        };

        for avertissement in &rendu.avertissements {
            warn!("Proposition {}: {}", id, avertissement);
        }

        let chemin = format!(
            "propositions/{}/proposition.{}",
            id,
            template.file_type.extension()
        );

        // L'échec d'upload est fatal à cette tentative de génération
        if let Err(e) = self
            .storage
            .upload(&chemin, &rendu.contenu, template.file_type.content_type())
            .await
        {
            self.db.marquer_proposition_erreur(id, &e.to_string()).await?;
            return Err(e);
        }

        self.db.set_artefact_proposition(id, &chemin).await?;

        // Export unique : seul le gagnant de la transition optimiste débite.
        // Deux générations simultanées sur la même proposition produisent
        // exactement un débit.
        let gagnant = self
            .db
            .transition_proposition(id, StatutProposition::Ready, StatutProposition::Exported)
            .await?;

        if gagnant {
            let organisation = self.db.get_organisation(proposition.organisation_id).await?;
            match self
                .ledger
                .debit(organisation.id, organisation.tarif_document)
                .await
            {
                Ok(solde) => {
                    info!(
                        "Proposition {} exportée, organisation {} débitée de {}, solde {}",
                        id, organisation.id, organisation.tarif_document, solde
                    );
                }
                Err(e) => {
                    // L'artefact existe et est utilisable : l'export reste
                    // acquis, l'échec du débit part en réconciliation
                    // manuelle.
                    error!(
                        "Débit non réconcilié: organisation {} proposition {}: {}",
                        organisation.id, id, e
                    );
                }
            }
        } else {
            info!(
                "Proposition {} déjà exportée: regénération sans nouveau débit",
                id
            );
        }

        Ok(GenerationResult {
            file_url: self.storage.public_url(&chemin),
        })
    }

    /// Dérive des suggestions éditées par rapport à la référence machine
    ///
    /// None si la proposition n'a pas de référence à comparer.
    pub async fn evaluer_drift_proposition(
        &self,
        id: Uuid,
    ) -> Result<Option<EtatModifications>> {
        let proposition = self.db.get_proposition(id).await?;

        let Some(generees) = &proposition.suggestions_generees else {
            return Ok(None);
        };

        let courantes: &[Suggestion] = proposition
            .suggestions_editees
            .as_ref()
            .map(|j| j.0.as_slice())
            .unwrap_or(&generees.0.suggestions);

        Ok(Some(evaluer_drift(
            &generees.0,
            courantes,
            proposition.synthese_editee.as_deref(),
        )))
    }

    /// Clés logiques mappées par le template de la proposition
    async fn cles_template(&self, proposition: &Proposition) -> Result<Option<Vec<String>>> {
        let Some(template_id) = proposition.template_id else {
            return Ok(None);
        };

        let template: PropositionTemplate = self.db.get_template(template_id).await?;
        Ok(Some(
            template
                .file_config
                .0
                .cles_champs()
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
        ))
    }
}
