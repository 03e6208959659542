use nanopay_domain::model::{ProfileRecord, UserId};
use nanopay_domain::storage::{ProfileStore, StorageResult};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use crate::entity::profiles;
use crate::errors::{insert_error, parse_column, StorageError};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl ProfileStore for SeaOrmStorage {
    async fn insert_profile(&self, profile: ProfileRecord) -> StorageResult<ProfileRecord> {
        let model = profiles::ActiveModel {
            user_id: Set(profile.user_id.to_string()),
            name: Set(profile.name),
            email: Set(profile.email),
            avatar_url: Set(profile.avatar_url),
            created_at: Set(profile.created_at),
        };
        let created = model
            .insert(self.connection())
            .await
            .map_err(|err| insert_error(err, "profile"))?;
        profile_to_record(created)
    }

    async fn find_profile(&self, user_id: &UserId) -> StorageResult<Option<ProfileRecord>> {
        let maybe = profiles::Entity::find_by_id(user_id.to_string())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(profile_to_record).transpose()
    }
}

fn profile_to_record(model: profiles::Model) -> StorageResult<ProfileRecord> {
    Ok(ProfileRecord {
        user_id: parse_column::<UserId>(&model.user_id, "profiles.user_id")?,
        name: model.name,
        email: model.email,
        avatar_url: model.avatar_url,
        created_at: model.created_at,
    })
}
