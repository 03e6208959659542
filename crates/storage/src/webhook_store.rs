use nanopay_domain::model::{NewWebhook, ServiceId, WebhookEventType, WebhookId, WebhookRecord};
use nanopay_domain::storage::{StorageResult, WebhookStore};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set};

use crate::entity::webhooks;
use crate::errors::{insert_error, parse_column, StorageError};
use crate::SeaOrmStorage;

const EVENT_SEPARATOR: &str = ",";

#[async_trait::async_trait]
impl WebhookStore for SeaOrmStorage {
    async fn insert_webhook(&self, webhook: NewWebhook) -> StorageResult<WebhookRecord> {
        let event_types = webhook
            .event_types
            .iter()
            .map(|event| event.as_ref())
            .collect::<Vec<_>>()
            .join(EVENT_SEPARATOR);
        let model = webhooks::ActiveModel {
            id: Set(webhook.id.to_string()),
            service_id: Set(webhook.service_id.to_string()),
            name: Set(webhook.name),
            url: Set(webhook.url),
            active: Set(webhook.active),
            event_types: Set(event_types),
            created_at: Set(webhook.created_at),
        };
        let created = model
            .insert(self.connection())
            .await
            .map_err(|err| insert_error(err, "webhook"))?;
        webhook_to_record(created)
    }

    async fn list_webhooks(&self, service_id: &ServiceId) -> StorageResult<Vec<WebhookRecord>> {
        webhooks::Entity::find()
            .filter(webhooks::Column::ServiceId.eq(service_id.to_string()))
            .order_by_asc(webhooks::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(webhook_to_record)
            .collect()
    }

    async fn delete_webhook(
        &self,
        id: &WebhookId,
        service_id: &ServiceId,
    ) -> StorageResult<Option<WebhookRecord>> {
        let maybe = webhooks::Entity::find_by_id(id.to_string())
            .filter(webhooks::Column::ServiceId.eq(service_id.to_string()))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        let Some(model) = maybe else {
            return Ok(None);
        };
        let record = webhook_to_record(model.clone())?;
        model
            .delete(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(Some(record))
    }
}

fn webhook_to_record(model: webhooks::Model) -> StorageResult<WebhookRecord> {
    let event_types = model
        .event_types
        .split(EVENT_SEPARATOR)
        .filter(|value| !value.is_empty())
        .map(|value| parse_column::<WebhookEventType>(value, "webhooks.event_types"))
        .collect::<StorageResult<Vec<_>>>()?;
    Ok(WebhookRecord {
        id: parse_column::<WebhookId>(&model.id, "webhooks.id")?,
        service_id: parse_column::<ServiceId>(&model.service_id, "webhooks.service_id")?,
        name: model.name,
        url: model.url,
        active: model.active,
        event_types,
        created_at: model.created_at,
    })
}
