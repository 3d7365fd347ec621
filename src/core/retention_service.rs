// core/retention_service.rs
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::Proposition;
use crate::services::database::Database;
use crate::services::storage::Storage;
use crate::utils::error::Result;

/// Politique de rétention : historique borné par organisation
///
/// Invoquée de manière opportuniste avant la création d'un brouillon, pas
/// par un planificateur : une seule requête ordonnée, ré-invocable sans
/// risque.
pub struct RetentionService {
    db: Arc<Database>,
    storage: Arc<Storage>,
}

impl RetentionService {
    pub fn new(db: Arc<Database>, storage: Arc<Storage>) -> Self {
        Self { db, storage }
    }

    /// Supprime les propositions au-delà des `conservees` plus récentes
    ///
    /// Les lignes sont supprimées d'abord — le nombre de lignes borné prime
    /// sur l'hygiène du stockage — puis les objets référencés sont supprimés
    /// en continuant sur échec. Retourne le nombre de lignes supprimées.
    pub async fn enforce_retention(&self, organisation_id: Uuid, conservees: i64) -> Result<u64> {
        let victimes = self
            .db
            .lister_propositions_excedentaires(organisation_id, conservees)
            .await?;

        if victimes.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = victimes.iter().map(|p| p.id).collect();
        let chemins: Vec<String> = victimes.iter().flat_map(chemins_objets).collect();

        let supprimees = self.db.delete_propositions(&ids).await?;
        self.storage.delete_objects(&chemins).await;

        info!(
            "Rétention organisation {}: {} propositions supprimées, {} objets de stockage",
            organisation_id,
            supprimees,
            chemins.len()
        );

        Ok(supprimees)
    }

    /// Suppression explicite d'une proposition par l'utilisateur
    ///
    /// Même cascade que la rétention : la ligne puis tous les objets de
    /// stockage qu'elle référence.
    pub async fn supprimer_proposition(&self, id: Uuid) -> Result<()> {
        let proposition = self.db.get_proposition(id).await?;
        let chemins = chemins_objets(&proposition);

        self.db.delete_propositions(&[id]).await?;
        self.storage.delete_objects(&chemins).await;

        Ok(())
    }
}

/// Objets de stockage référencés par une proposition : documents sources
/// puis artefact généré
pub fn chemins_objets(proposition: &Proposition) -> Vec<String> {
    let mut chemins = proposition.source_documents.0.clone();
    if let Some(artefact) = &proposition.duplicated_template_url {
        chemins.push(artefact.clone());
    }
    chemins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chemins_comprennent_sources_et_artefact() {
        let mut proposition = Proposition::new(Uuid::new_v4(), None, None);
        proposition.source_documents =
            sqlx::types::Json(vec!["sources/a.pdf".to_string(), "sources/b.pdf".to_string()]);
        proposition.duplicated_template_url = Some("artefacts/p.xlsx".to_string());

        let chemins = chemins_objets(&proposition);
        assert_eq!(
            chemins,
            vec!["sources/a.pdf", "sources/b.pdf", "artefacts/p.xlsx"]
        );
    }

    #[test]
    fn proposition_sans_artefact() {
        let proposition = Proposition::new(Uuid::new_v4(), None, None);
        assert!(chemins_objets(&proposition).is_empty());
    }
}
