use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};
use vmforge_crypto::{CipherError, CredentialCipher};
use vmforge_types::TenantId;

/// Per-tenant vCenter connection settings. The password is stored only
/// as ciphertext; [`VmwareConfigurationStore::load`] decrypts it on the
/// way out, so every other layer only ever sees the credential at the
/// moment it's handed to the hypervisor port.
#[derive(Debug, Clone)]
pub struct VmwareConfiguration {
    pub tenant_id: TenantId,
    pub vcenter_url: String,
    pub cluster: String,
    pub datastore: String,
    pub network: String,
    pub template: String,
    pub password: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub version: i64,
}

struct StoredRow {
    tenant_id: TenantId,
    vcenter_url: String,
    cluster: String,
    datastore: String,
    network: String,
    template: String,
    encrypted_password: Vec<u8>,
    verified_at: Option<DateTime<Utc>>,
    version: i64,
}

impl FromRow<'_, PgRow> for StoredRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRow {
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            vcenter_url: row.try_get("vcenter_url")?,
            cluster: row.try_get("cluster")?,
            datastore: row.try_get("datastore")?,
            network: row.try_get("network")?,
            template: row.try_get("template")?,
            encrypted_password: row.try_get("encrypted_password")?,
            verified_at: row.try_get("verified_at")?,
            version: row.try_get("version")?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VmwareConfigurationError {
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// CRUD over per-tenant vCenter configuration, with the password
/// encrypted at rest via a [`CredentialCipher`].
pub struct VmwareConfigurationStore {
    pool: PgPool,
    cipher: Box<dyn CredentialCipher>,
}

impl VmwareConfigurationStore {
    pub fn new(pool: PgPool, cipher: Box<dyn CredentialCipher>) -> Self {
        Self { pool, cipher }
    }

    fn associated_data(tenant_id: TenantId) -> Vec<u8> {
        tenant_id.as_uuid().as_bytes().to_vec()
    }

    pub async fn save(
        &self,
        tenant_id: TenantId,
        vcenter_url: &str,
        cluster: &str,
        datastore: &str,
        network: &str,
        template: &str,
        password: &str,
    ) -> Result<(), VmwareConfigurationError> {
        let encrypted_password = self.cipher.encrypt(password.as_bytes(), &Self::associated_data(tenant_id))?;
        sqlx::query(
            r#"
            INSERT INTO vmware_configuration
                (tenant_id, vcenter_url, cluster, datastore, network, template, encrypted_password, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
            ON CONFLICT (tenant_id) DO UPDATE SET
                vcenter_url = excluded.vcenter_url,
                cluster = excluded.cluster,
                datastore = excluded.datastore,
                network = excluded.network,
                template = excluded.template,
                encrypted_password = excluded.encrypted_password,
                verified_at = NULL,
                version = vmware_configuration.version + 1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(vcenter_url)
        .bind(cluster)
        .bind(datastore)
        .bind(network)
        .bind(template)
        .bind(encrypted_password)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load(&self, tenant_id: TenantId) -> Result<Option<VmwareConfiguration>, VmwareConfigurationError> {
        let row: Option<StoredRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, vcenter_url, cluster, datastore, network, template,
                   encrypted_password, verified_at, version
            FROM vmware_configuration
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let password_bytes = self.cipher.decrypt(&row.encrypted_password, &Self::associated_data(tenant_id))?;
        let password = String::from_utf8_lossy(&password_bytes).into_owned();

        Ok(Some(VmwareConfiguration {
            tenant_id: row.tenant_id,
            vcenter_url: row.vcenter_url,
            cluster: row.cluster,
            datastore: row.datastore,
            network: row.network,
            template: row.template,
            password,
            verified_at: row.verified_at,
            version: row.version,
        }))
    }

    pub async fn mark_verified(&self, tenant_id: TenantId) -> Result<(), VmwareConfigurationError> {
        sqlx::query("UPDATE vmware_configuration SET verified_at = now() WHERE tenant_id = $1")
            .bind(tenant_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
