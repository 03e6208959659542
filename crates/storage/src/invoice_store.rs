use std::collections::HashMap;

use nanopay_domain::model::{
    status_after_payment, status_after_refund, InvoiceId, InvoiceOrderBy, InvoicePage,
    InvoiceRecord, InvoiceStatus, NewInvoice, NewPayment, PaymentId, PaymentRecord, Raw,
    RefundOutcome, ServiceId, SortOrder, StatusChange, CURRENCY,
};
use nanopay_domain::storage::{InvoiceStore, StorageResult};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::{Map, Value};

use crate::entity::{invoices, payments};
use crate::errors::{insert_error, parse_amount, parse_column, StorageError};
use crate::SeaOrmStorage;

/// Compare-and-set writes retry this many times before giving up on an
/// invoice that keeps changing underneath them.
const MAX_CAS_ATTEMPTS: usize = 3;

#[async_trait::async_trait]
impl InvoiceStore for SeaOrmStorage {
    async fn insert_invoice(&self, invoice: NewInvoice) -> StorageResult<InvoiceRecord> {
        let metadata = invoice
            .metadata
            .map(|map| serde_json::to_string(&map))
            .transpose()
            .map_err(StorageError::from_source)?;
        let model = invoices::ActiveModel {
            id: Set(invoice.id.to_string()),
            service_id: Set(invoice.service_id.to_string()),
            title: Set(invoice.title),
            description: Set(invoice.description),
            price: Set(invoice.price.to_string()),
            recipient_address: Set(invoice.recipient_address),
            metadata: Set(metadata),
            redirect_url: Set(invoice.redirect_url),
            currency: Set(CURRENCY.to_string()),
            status: Set(InvoiceStatus::Pending.to_string()),
            pay_address: Set(invoice.pay_address),
            received_amount: Set(Raw::ZERO.to_string()),
            refunded_amount: Set(Raw::ZERO.to_string()),
            expires_at: Set(invoice.expires_at),
            created_at: Set(invoice.created_at),
        };
        let created = model
            .insert(self.connection())
            .await
            .map_err(|err| insert_error(err, "invoice"))?;
        invoice_to_record(created, Vec::new())
    }

    async fn find_invoice(&self, id: &InvoiceId) -> StorageResult<Option<InvoiceRecord>> {
        load_invoice(self.connection(), id, None).await
    }

    async fn find_invoice_for_service(
        &self,
        id: &InvoiceId,
        service_id: &ServiceId,
    ) -> StorageResult<Option<InvoiceRecord>> {
        load_invoice(self.connection(), id, Some(service_id)).await
    }

    async fn list_invoices(
        &self,
        service_id: &ServiceId,
        page: InvoicePage,
    ) -> StorageResult<(Vec<InvoiceRecord>, u64)> {
        let scoped =
            invoices::Entity::find().filter(invoices::Column::ServiceId.eq(service_id.to_string()));
        let total = scoped
            .clone()
            .count(self.connection())
            .await
            .map_err(StorageError::from_source)?;

        let order = match page.order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };
        let column = match page.order_by {
            InvoiceOrderBy::Name => invoices::Column::Title,
            InvoiceOrderBy::CreatedAt => invoices::Column::CreatedAt,
        };
        let models = scoped
            .order_by(column, order.clone())
            .order_by(invoices::Column::Id, order)
            .limit(page.limit)
            .offset(page.offset)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;

        let records = with_payments(self.connection(), models).await?;
        Ok((records, total))
    }

    async fn list_watchable_invoices(&self) -> StorageResult<Vec<InvoiceRecord>> {
        let watchable = InvoiceStatus::WATCHABLE.map(|status| status.to_string());
        let models = invoices::Entity::find()
            .filter(invoices::Column::Status.is_in(watchable))
            .order_by_asc(invoices::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        with_payments(self.connection(), models).await
    }

    async fn record_payment(&self, payment: NewPayment) -> StorageResult<Option<StatusChange>> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let txn = self
                .connection()
                .begin()
                .await
                .map_err(StorageError::from_source)?;

            let Some(model) = invoices::Entity::find_by_id(payment.invoice_id.to_string())
                .one(&txn)
                .await
                .map_err(StorageError::from_source)?
            else {
                return Ok(None);
            };
            let previous_status = parse_column::<InvoiceStatus>(&model.status, "invoices.status")?;
            if !previous_status.accepts_payments() {
                return Ok(None);
            }

            let seen = payments::Entity::find_by_id(payment.hash.clone())
                .one(&txn)
                .await
                .map_err(StorageError::from_source)?;
            if seen.is_some() {
                return Ok(None);
            }

            let price = parse_amount(&model.price, "invoices.price")?;
            let received = parse_amount(&model.received_amount, "invoices.received_amount")?
                .checked_add(payment.amount)
                .ok_or_else(|| StorageError::Corrupt("invoices.received_amount overflow".into()))?;
            let next_status = status_after_payment(price, received);

            let updated = invoices::Entity::update_many()
                .col_expr(
                    invoices::Column::ReceivedAmount,
                    Expr::value(received.to_string()),
                )
                .col_expr(invoices::Column::Status, Expr::value(next_status.to_string()))
                .filter(invoices::Column::Id.eq(model.id.clone()))
                .filter(invoices::Column::Status.eq(model.status.clone()))
                .filter(invoices::Column::ReceivedAmount.eq(model.received_amount.clone()))
                .exec(&txn)
                .await
                .map_err(StorageError::from_source)?;
            if updated.rows_affected == 0 {
                continue;
            }

            let row = payments::ActiveModel {
                hash: Set(payment.hash.clone()),
                id: Set(PaymentId::new_v4().to_string()),
                invoice_id: Set(model.id.clone()),
                from_address: Set(payment.from.clone()),
                to_address: Set(payment.to.clone()),
                amount: Set(payment.amount.to_string()),
                timestamp: Set(payment.timestamp),
            };
            payments::Entity::insert(row)
                .exec_without_returning(&txn)
                .await
                .map_err(|err| insert_error(err, "payment"))?;

            let invoice = load_invoice(&txn, &payment.invoice_id, None)
                .await?
                .ok_or_else(|| StorageError::Corrupt(format!("invoice {} vanished", model.id)))?;
            txn.commit().await.map_err(StorageError::from_source)?;
            return Ok(Some(StatusChange {
                invoice,
                previous_status,
            }));
        }

        Err(StorageError::Database(format!(
            "invoice {} kept changing while recording payment",
            payment.invoice_id
        )))
    }

    async fn transition_status(
        &self,
        id: &InvoiceId,
        from: &[InvoiceStatus],
        to: InvoiceStatus,
    ) -> StorageResult<Option<StatusChange>> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;
        let Some(model) = invoices::Entity::find_by_id(id.to_string())
            .one(&txn)
            .await
            .map_err(StorageError::from_source)?
        else {
            return Ok(None);
        };
        let previous_status = parse_column::<InvoiceStatus>(&model.status, "invoices.status")?;
        if !from.contains(&previous_status) {
            return Ok(None);
        }

        let updated = invoices::Entity::update_many()
            .col_expr(invoices::Column::Status, Expr::value(to.to_string()))
            .filter(invoices::Column::Id.eq(model.id.clone()))
            .filter(invoices::Column::Status.eq(model.status))
            .exec(&txn)
            .await
            .map_err(StorageError::from_source)?;
        if updated.rows_affected == 0 {
            return Ok(None);
        }

        let invoice = load_invoice(&txn, id, None)
            .await?
            .ok_or_else(|| StorageError::Corrupt(format!("invoice {id} vanished")))?;
        txn.commit().await.map_err(StorageError::from_source)?;
        Ok(Some(StatusChange {
            invoice,
            previous_status,
        }))
    }

    async fn record_refund(&self, id: &InvoiceId, amount: Raw) -> StorageResult<RefundOutcome> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let txn = self
                .connection()
                .begin()
                .await
                .map_err(StorageError::from_source)?;
            let Some(model) = invoices::Entity::find_by_id(id.to_string())
                .one(&txn)
                .await
                .map_err(StorageError::from_source)?
            else {
                return Ok(RefundOutcome::NotFound);
            };
            let previous_status = parse_column::<InvoiceStatus>(&model.status, "invoices.status")?;
            if !previous_status.is_refundable() {
                return Ok(RefundOutcome::NotRefundable(previous_status));
            }

            let received = parse_amount(&model.received_amount, "invoices.received_amount")?;
            let refunded = parse_amount(&model.refunded_amount, "invoices.refunded_amount")?;
            let available = received.saturating_sub(refunded);
            if amount > available {
                return Ok(RefundOutcome::ExceedsAvailable { available });
            }
            let refunded = refunded
                .checked_add(amount)
                .ok_or_else(|| StorageError::Corrupt("invoices.refunded_amount overflow".into()))?;
            let next_status = status_after_refund(received, refunded);

            let updated = invoices::Entity::update_many()
                .col_expr(
                    invoices::Column::RefundedAmount,
                    Expr::value(refunded.to_string()),
                )
                .col_expr(invoices::Column::Status, Expr::value(next_status.to_string()))
                .filter(invoices::Column::Id.eq(model.id.clone()))
                .filter(invoices::Column::Status.eq(model.status.clone()))
                .filter(invoices::Column::RefundedAmount.eq(model.refunded_amount.clone()))
                .exec(&txn)
                .await
                .map_err(StorageError::from_source)?;
            if updated.rows_affected == 0 {
                continue;
            }

            let invoice = load_invoice(&txn, id, None)
                .await?
                .ok_or_else(|| StorageError::Corrupt(format!("invoice {id} vanished")))?;
            txn.commit().await.map_err(StorageError::from_source)?;
            return Ok(RefundOutcome::Applied(StatusChange {
                invoice,
                previous_status,
            }));
        }

        Err(StorageError::Database(format!(
            "invoice {id} kept changing while recording refund"
        )))
    }
}

async fn load_invoice<C>(
    db: &C,
    id: &InvoiceId,
    service_id: Option<&ServiceId>,
) -> StorageResult<Option<InvoiceRecord>>
where
    C: ConnectionTrait,
{
    let mut query = invoices::Entity::find_by_id(id.to_string());
    if let Some(service_id) = service_id {
        query = query.filter(invoices::Column::ServiceId.eq(service_id.to_string()));
    }
    let Some(model) = query.one(db).await.map_err(StorageError::from_source)? else {
        return Ok(None);
    };
    let payments = payments::Entity::find()
        .filter(payments::Column::InvoiceId.eq(model.id.clone()))
        .order_by_asc(payments::Column::Timestamp)
        .all(db)
        .await
        .map_err(StorageError::from_source)?
        .into_iter()
        .map(payment_to_record)
        .collect::<StorageResult<Vec<_>>>()?;
    invoice_to_record(model, payments).map(Some)
}

/// Attaches payments to a batch of invoices with a single extra query.
async fn with_payments<C>(db: &C, models: Vec<invoices::Model>) -> StorageResult<Vec<InvoiceRecord>>
where
    C: ConnectionTrait,
{
    if models.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = models.iter().map(|model| model.id.clone()).collect();
    let mut grouped: HashMap<String, Vec<PaymentRecord>> = HashMap::new();
    for row in payments::Entity::find()
        .filter(payments::Column::InvoiceId.is_in(ids))
        .order_by_asc(payments::Column::Timestamp)
        .all(db)
        .await
        .map_err(StorageError::from_source)?
    {
        let invoice_id = row.invoice_id.clone();
        grouped
            .entry(invoice_id)
            .or_default()
            .push(payment_to_record(row)?);
    }

    models
        .into_iter()
        .map(|model| {
            let payments = grouped.remove(&model.id).unwrap_or_default();
            invoice_to_record(model, payments)
        })
        .collect()
}

fn invoice_to_record(
    model: invoices::Model,
    payments: Vec<PaymentRecord>,
) -> StorageResult<InvoiceRecord> {
    let metadata = model
        .metadata
        .as_deref()
        .map(serde_json::from_str::<Map<String, Value>>)
        .transpose()
        .map_err(|err| StorageError::Corrupt(format!("invoices.metadata: {err}")))?;
    Ok(InvoiceRecord {
        id: parse_column::<InvoiceId>(&model.id, "invoices.id")?,
        service_id: parse_column::<ServiceId>(&model.service_id, "invoices.service_id")?,
        title: model.title,
        description: model.description,
        price: parse_amount(&model.price, "invoices.price")?,
        recipient_address: model.recipient_address,
        metadata,
        redirect_url: model.redirect_url,
        currency: model.currency,
        status: parse_column::<InvoiceStatus>(&model.status, "invoices.status")?,
        pay_address: model.pay_address,
        received_amount: parse_amount(&model.received_amount, "invoices.received_amount")?,
        refunded_amount: parse_amount(&model.refunded_amount, "invoices.refunded_amount")?,
        expires_at: model.expires_at,
        created_at: model.created_at,
        payments,
    })
}

fn payment_to_record(model: payments::Model) -> StorageResult<PaymentRecord> {
    Ok(PaymentRecord {
        id: parse_column::<PaymentId>(&model.id, "payments.id")?,
        invoice_id: parse_column::<InvoiceId>(&model.invoice_id, "payments.invoice_id")?,
        from: model.from_address,
        to: model.to_address,
        hash: model.hash,
        amount: parse_amount(&model.amount, "payments.amount")?,
        timestamp: model.timestamp,
    })
}
