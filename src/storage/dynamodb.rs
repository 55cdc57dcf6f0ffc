//! DynamoDB-backed implementation of [`LockStore`].
//!
//! Single-table schema: partition key `LockID` (string). Attributes:
//! `Owner` (S), `LeaseDurationMilliseconds` (N), `LastUpdatedTimeMilliseconds`
//! (N), `CreatedAtMilliseconds` (N), `RecordVersionNumber` (S), `Shard` (N),
//! `TTL` (N, the table's configured expiry attribute), `Data` (B). A global
//! secondary index on `(Shard, LastUpdatedTimeMilliseconds)` exists for
//! operator-side scans of stale rows; this adapter populates both attributes
//! correctly but never queries the index itself.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, GlobalSecondaryIndex, KeySchemaElement, KeyType,
    Projection, ProjectionType, ScalarAttributeType,
};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;

use crate::config::DynamoDbConfig;
use crate::core::lock_manager::LockRecord;
use crate::errors::{LockError, Result};
use crate::storage::{CasPut, LockStore};

const ATTR_LOCK_ID: &str = "LockID";
const ATTR_OWNER: &str = "Owner";
const ATTR_LEASE_DURATION_MS: &str = "LeaseDurationMilliseconds";
const ATTR_LAST_UPDATED_MS: &str = "LastUpdatedTimeMilliseconds";
const ATTR_CREATED_AT_MS: &str = "CreatedAtMilliseconds";
const ATTR_RECORD_VERSION: &str = "RecordVersionNumber";
const ATTR_SHARD: &str = "Shard";
const ATTR_TTL: &str = "TTL";
const ATTR_DATA: &str = "Data";

const SHARD_INDEX_NAME: &str = "ShardLastUpdatedIndex";

/// DynamoDB-backed storage adapter for the lock manager.
pub struct DynamoLockStore {
    client: Client,
    table_name: String,
}

impl DynamoLockStore {
    /// Build a client from the crate's `DynamoDbConfig`, using the standard
    /// AWS SDK environment credential chain and optionally overriding the
    /// endpoint URL for local development (DynamoDB Local).
    pub async fn new(config: &DynamoDbConfig) -> Self {
        let client = build_client(config).await;
        Self {
            client,
            table_name: config.table_name.clone(),
        }
    }

    /// Build from an existing client, useful when the client is shared with
    /// other components.
    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    fn record_to_item(record: &LockRecord) -> HashMap<String, AttributeValue> {
        let mut item = HashMap::new();
        item.insert(
            ATTR_LOCK_ID.to_string(),
            AttributeValue::S(record.lock_id.clone()),
        );
        item.insert(
            ATTR_OWNER.to_string(),
            AttributeValue::S(record.owner.clone()),
        );
        item.insert(
            ATTR_LEASE_DURATION_MS.to_string(),
            AttributeValue::N(record.lease_duration_ms.to_string()),
        );
        item.insert(
            ATTR_LAST_UPDATED_MS.to_string(),
            AttributeValue::N(record.last_updated_ms.to_string()),
        );
        item.insert(
            ATTR_CREATED_AT_MS.to_string(),
            AttributeValue::N(record.created_at_ms.to_string()),
        );
        item.insert(
            ATTR_RECORD_VERSION.to_string(),
            AttributeValue::S(record.record_version.clone()),
        );
        item.insert(
            ATTR_SHARD.to_string(),
            AttributeValue::N(record.shard.to_string()),
        );
        item.insert(
            ATTR_TTL.to_string(),
            AttributeValue::N(record.ttl_epoch_s.to_string()),
        );
        item.insert(
            ATTR_DATA.to_string(),
            AttributeValue::B(aws_sdk_dynamodb::primitives::Blob::new(
                record.payload.clone(),
            )),
        );
        item
    }

    fn item_to_record(item: &HashMap<String, AttributeValue>) -> Result<LockRecord> {
        let get_s = |attr: &str| -> Result<String> {
            match item.get(attr) {
                Some(AttributeValue::S(s)) => Ok(s.clone()),
                _ => Err(LockError::Storage(format!("missing/invalid attribute {attr}"))),
            }
        };
        let get_n = |attr: &str| -> Result<i64> {
            match item.get(attr) {
                Some(AttributeValue::N(n)) => n
                    .parse::<i64>()
                    .map_err(|e| LockError::Storage(format!("invalid number in {attr}: {e}"))),
                _ => Err(LockError::Storage(format!("missing/invalid attribute {attr}"))),
            }
        };

        let payload = match item.get(ATTR_DATA) {
            Some(AttributeValue::B(blob)) => blob.clone().into_inner(),
            _ => Vec::new(),
        };

        Ok(LockRecord {
            lock_id: get_s(ATTR_LOCK_ID)?,
            owner: get_s(ATTR_OWNER)?,
            lease_duration_ms: get_n(ATTR_LEASE_DURATION_MS)?,
            last_updated_ms: get_n(ATTR_LAST_UPDATED_MS)?,
            created_at_ms: get_n(ATTR_CREATED_AT_MS)?,
            record_version: get_s(ATTR_RECORD_VERSION)?,
            shard: get_n(ATTR_SHARD)? as u32,
            ttl_epoch_s: get_n(ATTR_TTL)?,
            payload,
        })
    }
}

#[async_trait]
impl LockStore for DynamoLockStore {
    async fn get(&self, lock_id: &str) -> Result<Option<LockRecord>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(ATTR_LOCK_ID, AttributeValue::S(lock_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| LockError::Storage(e.to_string()))?;

        match result.item() {
            Some(item) => Ok(Some(Self::item_to_record(item)?)),
            None => Ok(None),
        }
    }

    async fn put_if_absent(&self, record: &LockRecord) -> Result<()> {
        let item = Self::record_to_item(record);
        let mut put = self.client.put_item().table_name(&self.table_name);
        for (k, v) in item {
            put = put.item(k, v);
        }

        let result = put
            .condition_expression(format!("attribute_not_exists({ATTR_LOCK_ID})"))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => translate_put_error(err),
        }
    }

    async fn put_cas(&self, put: CasPut<'_>) -> Result<()> {
        let item = Self::record_to_item(put.record);
        let mut request = self.client.put_item().table_name(&self.table_name);
        for (k, v) in item {
            request = request.item(k, v);
        }

        let condition = format!(
            "{ATTR_RECORD_VERSION} = :expected_version AND ({ATTR_OWNER} = :expected_owner OR \
             ({ATTR_OWNER} <> :expected_owner AND {ATTR_LAST_UPDATED_MS} < :steal_before_ms))"
        );

        let result = request
            .condition_expression(condition)
            .expression_attribute_values(
                ":expected_version",
                AttributeValue::S(put.expected_version.to_string()),
            )
            .expression_attribute_values(
                ":expected_owner",
                AttributeValue::S(put.expected_owner.to_string()),
            )
            .expression_attribute_values(
                ":steal_before_ms",
                AttributeValue::N(put.steal_before_ms.to_string()),
            )
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => translate_put_error(err),
        }
    }

    async fn delete_cas(&self, lock_id: &str, expected_owner: &str, expected_version: &str) -> Result<()> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key(ATTR_LOCK_ID, AttributeValue::S(lock_id.to_string()))
            .condition_expression(format!(
                "{ATTR_OWNER} = :expected_owner AND {ATTR_RECORD_VERSION} = :expected_version"
            ))
            .expression_attribute_values(
                ":expected_owner",
                AttributeValue::S(expected_owner.to_string()),
            )
            .expression_attribute_values(
                ":expected_version",
                AttributeValue::S(expected_version.to_string()),
            )
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => translate_delete_error(err),
        }
    }
}

/// Maps a `ConditionalCheckFailedException` from `PutItem` to
/// `PreconditionFailed`; every other SDK error surfaces as `Storage`.
fn translate_put_error(
    err: aws_sdk_dynamodb::error::SdkError<aws_sdk_dynamodb::operation::put_item::PutItemError>,
) -> Result<()> {
    let service_err = err.into_service_error();
    if service_err.is_conditional_check_failed_exception() {
        Err(LockError::PreconditionFailed)
    } else {
        Err(LockError::Storage(service_err.to_string()))
    }
}

/// Maps a `ConditionalCheckFailedException` from `DeleteItem` to
/// `PreconditionFailed`; every other SDK error surfaces as `Storage`.
fn translate_delete_error(
    err: aws_sdk_dynamodb::error::SdkError<aws_sdk_dynamodb::operation::delete_item::DeleteItemError>,
) -> Result<()> {
    let service_err = err.into_service_error();
    if service_err.is_conditional_check_failed_exception() {
        Err(LockError::PreconditionFailed)
    } else {
        Err(LockError::Storage(service_err.to_string()))
    }
}

/// Build an AWS DynamoDB client from the provided configuration.
pub async fn build_client(config: &DynamoDbConfig) -> Client {
    let mut aws_config =
        aws_config::from_env().region(aws_config::Region::new(config.region.clone()));

    if let Some(endpoint) = &config.endpoint_url {
        aws_config = aws_config.endpoint_url(endpoint);
    }

    let sdk_config = aws_config.load().await;
    Client::new(&sdk_config)
}

/// Creates the lock table and its shard/last-updated GSI.
///
/// Intended for tests and local development; in production the table is
/// provisioned out of band. Idempotent: tolerates the table already existing.
pub async fn create_table(client: &Client, table_name: &str) -> Result<()> {
    let result = client
        .create_table()
        .table_name(table_name)
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(ATTR_LOCK_ID)
                .key_type(KeyType::Hash)
                .build()
                .expect("valid key schema"),
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(ATTR_LOCK_ID)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .expect("valid attribute definition"),
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(ATTR_SHARD)
                .attribute_type(ScalarAttributeType::N)
                .build()
                .expect("valid attribute definition"),
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(ATTR_LAST_UPDATED_MS)
                .attribute_type(ScalarAttributeType::N)
                .build()
                .expect("valid attribute definition"),
        )
        .global_secondary_indexes(
            GlobalSecondaryIndex::builder()
                .index_name(SHARD_INDEX_NAME)
                .key_schema(
                    KeySchemaElement::builder()
                        .attribute_name(ATTR_SHARD)
                        .key_type(KeyType::Hash)
                        .build()
                        .expect("valid key schema"),
                )
                .key_schema(
                    KeySchemaElement::builder()
                        .attribute_name(ATTR_LAST_UPDATED_MS)
                        .key_type(KeyType::Range)
                        .build()
                        .expect("valid key schema"),
                )
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()
                .expect("valid gsi"),
        )
        .billing_mode(aws_sdk_dynamodb::types::BillingMode::PayPerRequest)
        .send()
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) => {
            let service_err = err.into_service_error();
            if service_err.is_resource_in_use_exception() {
                Ok(())
            } else {
                Err(LockError::Storage(service_err.to_string()))
            }
        }
    }
}
