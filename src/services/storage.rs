// services/storage.rs
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    primitives::ByteStream,
    Client as S3Client,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::utils::error::{AppError, Result};

/// Stockage des binaires : gabarits, documents sources, artefacts générés
///
/// S3/MinIO en production, répertoire local en développement, comme pour
/// le reste de la plateforme. Les chemins d'objets sont relatifs au bucket.
pub struct Storage {
    s3_client: Option<S3Client>,
    local_dir: PathBuf,
    bucket: String,
    max_file_size: u64,
}

impl Storage {
    pub fn new(
        endpoint: Option<&str>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
        region: &str,
        bucket: &str,
        local_dir: &Path,
        max_file_size_mb: u64,
    ) -> Self {
        let s3_client = if let (Some(endpoint), Some(access_key), Some(secret_key)) =
            (endpoint, access_key, secret_key)
        {
            Some(Self::create_s3_client(endpoint, access_key, secret_key, region))
        } else {
            None
        };

        Self {
            s3_client,
            local_dir: local_dir.to_path_buf(),
            bucket: bucket.to_string(),
            max_file_size: max_file_size_mb * 1024 * 1024,
        }
    }

    fn create_s3_client(endpoint: &str, access_key: &str, secret_key: &str, region: &str) -> S3Client {
        let creds = Credentials::new(access_key, secret_key, None, None, "minio");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(creds)
            .endpoint_url(endpoint)
            .region(Region::new(region.to_string()))
            .force_path_style(true)
            .build();

        S3Client::from_conf(config)
    }

    /// Uploade un binaire et retourne son chemin d'objet
    pub async fn upload(&self, chemin: &str, contenu: &[u8], content_type: &str) -> Result<String> {
        if contenu.len() as u64 > self.max_file_size {
            return Err(AppError::Storage(format!(
                "fichier trop volumineux: {} octets",
                contenu.len()
            )));
        }

        if let Some(client) = &self.s3_client {
            client
                .put_object()
                .bucket(&self.bucket)
                .key(chemin)
                .content_type(content_type)
                .body(ByteStream::from(contenu.to_vec()))
                .send()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        } else {
            let chemin_local = self.local_dir.join(chemin);
            if let Some(parent) = chemin_local.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::Storage(e.to_string()))?;
            }

            let mut fichier = fs::File::create(&chemin_local)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            fichier
                .write_all(contenu)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        }

        Ok(chemin.to_string())
    }

    /// Télécharge un binaire
    pub async fn download(&self, chemin: &str) -> Result<Vec<u8>> {
        if let Some(client) = &self.s3_client {
            let reponse = client
                .get_object()
                .bucket(&self.bucket)
                .key(chemin)
                .send()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;

            let octets = reponse
                .body
                .collect()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?
                .into_bytes()
                .to_vec();

            Ok(octets)
        } else {
            fs::read(self.local_dir.join(chemin))
                .await
                .map_err(|e| AppError::Storage(e.to_string()))
        }
    }

    /// Supprime un lot d'objets en continuant sur échec
    ///
    /// La cohérence de la base prime sur l'hygiène du stockage : un objet
    /// insupprimable est signalé puis ignoré, jamais propagé à l'appelant.
    pub async fn delete_objects(&self, chemins: &[String]) {
        for chemin in chemins {
            if let Err(e) = self.delete_object(chemin).await {
                warn!("Suppression d'objet échouée, ignorée: {} ({})", chemin, e);
            }
        }
    }

    async fn delete_object(&self, chemin: &str) -> Result<()> {
        if let Some(client) = &self.s3_client {
            client
                .delete_object()
                .bucket(&self.bucket)
                .key(chemin)
                .send()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        } else {
            fs::remove_file(self.local_dir.join(chemin))
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    /// URL publique d'un objet
    pub fn public_url(&self, chemin: &str) -> String {
        match &self.s3_client {
            Some(_) => format!("/{}/{}", self.bucket, chemin),
            None => format!("/storage/{}", chemin),
        }
    }
}
