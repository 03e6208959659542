use nanopay_domain::model::{ApiKeyHash, ApiKeyId, ApiKeyRecord, NewApiKey, ServiceId};
use nanopay_domain::storage::{ApiKeyStore, StorageResult};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set};

use crate::entity::api_keys;
use crate::errors::{insert_error, parse_column, StorageError};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl ApiKeyStore for SeaOrmStorage {
    async fn insert_api_key(&self, key: NewApiKey) -> StorageResult<ApiKeyRecord> {
        let model = api_keys::ActiveModel {
            id: Set(key.id.to_string()),
            service_id: Set(key.service_id.to_string()),
            name: Set(key.name),
            description: Set(key.description),
            key_hash: Set(key.key_hash.into_inner()),
            created_at: Set(key.created_at),
        };
        let created = model
            .insert(self.connection())
            .await
            .map_err(|err| insert_error(err, "api key"))?;
        api_key_to_record(created)
    }

    async fn find_api_key_by_hash(&self, hash: &ApiKeyHash) -> StorageResult<Option<ApiKeyRecord>> {
        let maybe = api_keys::Entity::find()
            .filter(api_keys::Column::KeyHash.eq(hash.as_str()))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(api_key_to_record).transpose()
    }

    async fn list_api_keys(&self, service_id: &ServiceId) -> StorageResult<Vec<ApiKeyRecord>> {
        api_keys::Entity::find()
            .filter(api_keys::Column::ServiceId.eq(service_id.to_string()))
            .order_by_desc(api_keys::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(api_key_to_record)
            .collect()
    }

    async fn delete_api_key(
        &self,
        id: &ApiKeyId,
        service_id: &ServiceId,
    ) -> StorageResult<Option<ApiKeyRecord>> {
        let maybe = api_keys::Entity::find_by_id(id.to_string())
            .filter(api_keys::Column::ServiceId.eq(service_id.to_string()))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        let Some(model) = maybe else {
            return Ok(None);
        };
        let record = api_key_to_record(model.clone())?;
        model
            .delete(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(Some(record))
    }
}

fn api_key_to_record(model: api_keys::Model) -> StorageResult<ApiKeyRecord> {
    Ok(ApiKeyRecord {
        id: parse_column::<ApiKeyId>(&model.id, "api_keys.id")?,
        service_id: parse_column::<ServiceId>(&model.service_id, "api_keys.service_id")?,
        name: model.name,
        description: model.description,
        key_hash: ApiKeyHash::new(model.key_hash),
        created_at: model.created_at,
    })
}
