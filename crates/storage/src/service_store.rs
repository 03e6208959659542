use nanopay_domain::model::{NewService, ServiceId, ServiceRecord, ServiceRef, UserId};
use nanopay_domain::storage::{ServiceStore, StorageResult};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::services;
use crate::errors::{insert_error, parse_column, StorageError};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl ServiceStore for SeaOrmStorage {
    async fn insert_service(&self, service: NewService) -> StorageResult<ServiceRecord> {
        let model = services::ActiveModel {
            id: Set(service.id.to_string()),
            user_id: Set(service.user_id.to_string()),
            name: Set(service.name),
            display_name: Set(service.display_name),
            avatar_url: Set(service.avatar_url),
            description: Set(None),
            website: Set(None),
            contact_email: Set(None),
            created_at: Set(service.created_at),
        };
        let created = model
            .insert(self.connection())
            .await
            .map_err(|err| insert_error(err, "service"))?;
        service_to_record(created)
    }

    async fn find_service(&self, service: &ServiceRef) -> StorageResult<Option<ServiceRecord>> {
        let filter = match service {
            ServiceRef::Id(id) => services::Column::Id.eq(id.to_string()),
            ServiceRef::Name(name) => services::Column::Name.eq(name.as_str()),
        };
        let maybe = services::Entity::find()
            .filter(filter)
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(service_to_record).transpose()
    }

    async fn list_services_for_user(&self, user_id: &UserId) -> StorageResult<Vec<ServiceRecord>> {
        services::Entity::find()
            .filter(services::Column::UserId.eq(user_id.to_string()))
            .order_by_asc(services::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(service_to_record)
            .collect()
    }
}

fn service_to_record(model: services::Model) -> StorageResult<ServiceRecord> {
    Ok(ServiceRecord {
        id: parse_column::<ServiceId>(&model.id, "services.id")?,
        user_id: parse_column::<UserId>(&model.user_id, "services.user_id")?,
        name: model.name,
        display_name: model.display_name,
        avatar_url: model.avatar_url,
        description: model.description,
        website: model.website,
        contact_email: model.contact_email,
        created_at: model.created_at,
    })
}
