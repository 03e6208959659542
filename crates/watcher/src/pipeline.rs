use std::collections::HashSet;

use chrono::{DateTime, Utc};
use metrics::counter;
use nanopay_domain::model::{
    status_after_expiry, InvoiceEvent, InvoiceRecord, InvoiceStatus, NewPayment, Raw,
};
use nanopay_domain::storage::InvoiceStore;
use tracing::{info, warn};

use crate::rpc::{LedgerSource, ReceivableBlock, RpcError};
use crate::worker::WatcherError;

/// Brings one watchable invoice up to date with the ledger: every send to its
/// pay address, pocketed or still receivable, becomes a payment, then an
/// overdue invoice is expired. Returns the events to announce, in order.
///
/// `receivable_count` bounds the new blocks read per source on each pass;
/// hashes already recorded widen the window so every pass makes progress.
pub async fn reconcile_invoice<S, L>(
    store: &S,
    ledger: &L,
    invoice: &InvoiceRecord,
    receivable_count: u64,
    now: DateTime<Utc>,
) -> Result<Vec<InvoiceEvent>, WatcherError>
where
    S: InvoiceStore,
    L: LedgerSource,
{
    let mut events = Vec::new();

    let window = receivable_count.saturating_add(invoice.payments.len() as u64);
    let blocks = match incoming_blocks(ledger, &invoice.pay_address, window).await {
        Ok(blocks) => blocks,
        Err(RpcError::InvalidAccount(account)) => {
            warn!(invoice = %invoice.id, account, "pay address rejected by node");
            counter!("watcher_invoices_total", "result" => "error").increment(1);
            if let Some(change) = store
                .transition_status(&invoice.id, &InvoiceStatus::WATCHABLE, InvoiceStatus::Error)
                .await?
            {
                events.extend(InvoiceEvent::for_current_status(change.invoice));
            }
            return Ok(events);
        }
        Err(err) => return Err(err.into()),
    };

    let mut status = invoice.status;
    let mut received = invoice.received_amount;

    for block in blocks {
        if !status.accepts_payments() {
            break;
        }
        if invoice.payments.iter().any(|payment| payment.hash == block.hash) {
            continue;
        }
        let amount = match Raw::parse_raw(&block.amount) {
            Ok(amount) if !amount.is_zero() => amount,
            Ok(_) => continue,
            Err(err) => {
                warn!(hash = block.hash, ?err, "skipping block with malformed amount");
                counter!("watcher_payments_total", "result" => "malformed").increment(1);
                continue;
            }
        };

        let recorded = store
            .record_payment(NewPayment {
                invoice_id: invoice.id,
                from: block.source,
                to: invoice.pay_address.clone(),
                hash: block.hash.clone(),
                amount,
                timestamp: now,
            })
            .await?;
        let Some(change) = recorded else {
            counter!("watcher_payments_total", "result" => "skipped").increment(1);
            continue;
        };

        counter!("watcher_payments_total", "result" => "recorded").increment(1);
        info!(
            invoice = %invoice.id,
            hash = block.hash,
            amount = %amount,
            status = %change.invoice.status,
            "payment recorded"
        );
        status = change.invoice.status;
        received = change.invoice.received_amount;
        if change.changed() {
            events.extend(InvoiceEvent::for_current_status(change.invoice));
        }
    }

    if status.accepts_payments() && now >= invoice.expires_at {
        let next = status_after_expiry(received);
        if let Some(change) = store
            .transition_status(&invoice.id, &[status], next)
            .await?
        {
            counter!("watcher_invoices_total", "result" => next.as_ref().to_owned()).increment(1);
            info!(invoice = %invoice.id, status = %next, "invoice window closed");
            events.extend(InvoiceEvent::for_current_status(change.invoice));
        }
    }

    Ok(events)
}

/// Pocketed receives first, then pending sends, each send hash once.
async fn incoming_blocks<L>(
    ledger: &L,
    account: &str,
    window: u64,
) -> Result<Vec<ReceivableBlock>, RpcError>
where
    L: LedgerSource,
{
    let received = ledger.received(account, window).await?;
    let receivable = ledger.receivable(account, window).await?;
    let mut seen = HashSet::new();
    Ok(received
        .into_iter()
        .chain(receivable)
        .filter(|block| seen.insert(block.hash.clone()))
        .collect())
}
