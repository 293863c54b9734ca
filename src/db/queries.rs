use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection};

use crate::models::{
    BookingContext, BookingRequest, Draft, DraftStatus, Hold, HoldStatus, RequestStatus,
};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub fn fmt_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FMT).to_string()
}

// A row that fails to parse is corruption and surfaces as an error
// rather than a default value.
fn parse_ts(s: &str) -> Result<NaiveDateTime, rusqlite::Error> {
    NaiveDateTime::parse_from_str(s, TS_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ── Availability ──

/// A window is free iff it overlaps zero approved requests and zero live
/// holds. Overlap is half-open: `a.start < b.end && b.start < a.end`.
/// `ignore_hold_id` lets a draft's own hold pass its confirmation re-check.
/// Holds past their expiry never block, even before the reaper has run.
pub fn is_window_available(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    ignore_hold_id: Option<i64>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let start_s = fmt_ts(start);
    let end_s = fmt_ts(end);
    let now_s = fmt_ts(now);

    let approved: i64 = conn.query_row(
        "SELECT COUNT(*) FROM booking_requests
         WHERE status = 'approved' AND start_at < ?1 AND end_at > ?2",
        params![end_s, start_s],
        |row| row.get(0),
    )?;
    if approved > 0 {
        return Ok(false);
    }

    let holds: i64 = conn.query_row(
        "SELECT COUNT(*) FROM booking_holds
         WHERE status = 'active' AND expires_at > ?1
           AND id != ?2 AND start_at < ?3 AND end_at > ?4",
        params![now_s, ignore_hold_id.unwrap_or(-1), end_s, start_s],
        |row| row.get(0),
    )?;
    Ok(holds == 0)
}

// ── Holds ──

pub fn create_hold(
    conn: &Connection,
    customer_id: &str,
    service_key: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    ttl_minutes: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<i64> {
    let expires = *now + Duration::minutes(ttl_minutes);
    conn.execute(
        "INSERT INTO booking_holds
            (created_at, expires_at, customer_id, service_key, start_at, end_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active')",
        params![
            fmt_ts(now),
            fmt_ts(&expires),
            customer_id,
            service_key,
            fmt_ts(start),
            fmt_ts(end),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Idempotent: only an `active` hold transitions; released and expired are
/// terminal, so a second release is a no-op.
pub fn release_hold(conn: &Connection, hold_id: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE booking_holds SET status = 'released' WHERE id = ?1 AND status = 'active'",
        params![hold_id],
    )?;
    Ok(())
}

pub fn expire_stale_holds(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE booking_holds SET status = 'expired'
         WHERE status = 'active' AND expires_at <= ?1",
        params![fmt_ts(now)],
    )?;
    Ok(count)
}

pub fn get_hold(conn: &Connection, hold_id: i64) -> anyhow::Result<Option<Hold>> {
    let result = conn.query_row(
        "SELECT id, created_at, expires_at, customer_id, service_key, start_at, end_at,
                request_id, status
         FROM booking_holds WHERE id = ?1",
        params![hold_id],
        |row| {
            Ok(Hold {
                id: row.get(0)?,
                created_at: parse_ts(&row.get::<_, String>(1)?)?,
                expires_at: parse_ts(&row.get::<_, String>(2)?)?,
                customer_id: row.get(3)?,
                service_key: row.get(4)?,
                start_at: parse_ts(&row.get::<_, String>(5)?)?,
                end_at: parse_ts(&row.get::<_, String>(6)?)?,
                request_id: row.get(7)?,
                status: HoldStatus::parse(&row.get::<_, String>(8)?),
            })
        },
    );

    match result {
        Ok(hold) => Ok(Some(hold)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn link_hold_to_request(
    conn: &Connection,
    hold_id: i64,
    request_id: i64,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE booking_holds SET request_id = ?1 WHERE id = ?2",
        params![request_id, hold_id],
    )?;
    Ok(())
}

pub fn find_hold_by_request(conn: &Connection, request_id: i64) -> anyhow::Result<Option<i64>> {
    let result = conn.query_row(
        "SELECT id FROM booking_holds WHERE request_id = ?1 ORDER BY id DESC LIMIT 1",
        params![request_id],
        |row| row.get(0),
    );

    match result {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Drafts ──

/// Inserts a new `proposed` draft, first cancelling any existing proposed
/// draft for the customer and releasing its hold. Callers keep the
/// connection lock across the availability check, the hold insert, and this
/// call, so the single-active-draft invariant holds under concurrent
/// webhook deliveries.
#[allow(clippy::too_many_arguments)]
pub fn create_draft(
    conn: &Connection,
    channel_id: &str,
    customer_id: &str,
    service_key: &str,
    service_label: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    hold_id: i64,
    ttl_minutes: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<i64> {
    let mut stmt = conn.prepare(
        "SELECT id, hold_id FROM booking_drafts
         WHERE customer_id = ?1 AND status = 'proposed'",
    )?;
    let old: Vec<(i64, i64)> = stmt
        .query_map(params![customer_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    for (old_id, old_hold_id) in old {
        conn.execute(
            "UPDATE booking_drafts SET status = 'cancelled' WHERE id = ?1 AND status = 'proposed'",
            params![old_id],
        )?;
        release_hold(conn, old_hold_id)?;
    }

    let expires = *now + Duration::minutes(ttl_minutes);
    conn.execute(
        "INSERT INTO booking_drafts
            (created_at, expires_at, channel_id, customer_id, service_key, service_label,
             start_at, end_at, hold_id, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'proposed')",
        params![
            fmt_ts(now),
            fmt_ts(&expires),
            channel_id,
            customer_id,
            service_key,
            service_label,
            fmt_ts(start),
            fmt_ts(end),
            hold_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn expire_old_drafts(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let now_s = fmt_ts(now);

    let mut stmt = conn.prepare(
        "SELECT hold_id FROM booking_drafts WHERE status = 'proposed' AND expires_at <= ?1",
    )?;
    let hold_ids: Vec<i64> = stmt
        .query_map(params![now_s], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let count = conn.execute(
        "UPDATE booking_drafts SET status = 'expired'
         WHERE status = 'proposed' AND expires_at <= ?1",
        params![now_s],
    )?;

    for hold_id in hold_ids {
        release_hold(conn, hold_id)?;
    }

    Ok(count)
}

/// Reaps expired drafts first, then returns the newest `proposed` draft.
pub fn get_active_draft(
    conn: &Connection,
    customer_id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<Draft>> {
    expire_old_drafts(conn, now)?;

    let result = conn.query_row(
        "SELECT id, created_at, expires_at, channel_id, customer_id, service_key, service_label,
                start_at, end_at, hold_id, status
         FROM booking_drafts
         WHERE customer_id = ?1 AND status = 'proposed'
         ORDER BY id DESC LIMIT 1",
        params![customer_id],
        parse_draft_row,
    );

    match result {
        Ok(draft) => Ok(Some(draft)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_draft(conn: &Connection, draft_id: i64) -> anyhow::Result<Option<Draft>> {
    let result = conn.query_row(
        "SELECT id, created_at, expires_at, channel_id, customer_id, service_key, service_label,
                start_at, end_at, hold_id, status
         FROM booking_drafts WHERE id = ?1",
        params![draft_id],
        parse_draft_row,
    );

    match result {
        Ok(draft) => Ok(Some(draft)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Confirm-time fallback: the claim already moved the draft to
/// `confirmed` and then the window turned out to be gone, so it ends
/// `expired` instead.
pub fn expire_draft(conn: &Connection, draft_id: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE booking_drafts SET status = 'expired' WHERE id = ?1 AND status = 'confirmed'",
        params![draft_id],
    )?;
    Ok(())
}

/// Scoped by both draft id and customer id, and only a `proposed` draft
/// moves; a draft that already left `proposed` reads as gone.
pub fn mark_draft(
    conn: &Connection,
    customer_id: &str,
    draft_id: i64,
    status: DraftStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE booking_drafts SET status = ?1
         WHERE id = ?2 AND customer_id = ?3 AND status = 'proposed'",
        params![status.as_str(), draft_id, customer_id],
    )?;
    Ok(count > 0)
}

fn parse_draft_row(row: &rusqlite::Row) -> Result<Draft, rusqlite::Error> {
    Ok(Draft {
        id: row.get(0)?,
        created_at: parse_ts(&row.get::<_, String>(1)?)?,
        expires_at: parse_ts(&row.get::<_, String>(2)?)?,
        channel_id: row.get(3)?,
        customer_id: row.get(4)?,
        service_key: row.get(5)?,
        service_label: row.get(6)?,
        start_at: parse_ts(&row.get::<_, String>(7)?)?,
        end_at: parse_ts(&row.get::<_, String>(8)?)?,
        hold_id: row.get(9)?,
        status: DraftStatus::parse(&row.get::<_, String>(10)?),
    })
}

// ── Requests ──

/// Short opaque token for external display. Random, never derived from the
/// row id, so references are not enumerable.
fn new_public_ref() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[allow(clippy::too_many_arguments)]
pub fn create_request(
    conn: &Connection,
    channel_id: &str,
    customer_id: &str,
    service_key: &str,
    service_label: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    now: &NaiveDateTime,
) -> anyhow::Result<(i64, String)> {
    let public_ref = new_public_ref();
    conn.execute(
        "INSERT INTO booking_requests
            (public_ref, created_at, channel_id, customer_id, service_key, service_label,
             start_at, end_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending')",
        params![
            public_ref,
            fmt_ts(now),
            channel_id,
            customer_id,
            service_key,
            service_label,
            fmt_ts(start),
            fmt_ts(end),
        ],
    )?;
    Ok((conn.last_insert_rowid(), public_ref))
}

pub fn get_request(conn: &Connection, request_id: i64) -> anyhow::Result<Option<BookingRequest>> {
    let result = conn.query_row(
        "SELECT id, public_ref, created_at, channel_id, customer_id, service_key, service_label,
                start_at, end_at, status, admin_actor, decided_at, admin_note
         FROM booking_requests WHERE id = ?1",
        params![request_id],
        parse_request_row,
    );

    match result {
        Ok(req) => Ok(Some(req)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Accepts the public ref, or a bare numeric id as a fallback for admin
/// convenience.
pub fn resolve_request_id(conn: &Connection, reference: &str) -> anyhow::Result<Option<i64>> {
    let result = conn.query_row(
        "SELECT id FROM booking_requests WHERE public_ref = ?1",
        params![reference],
        |row| row.get::<_, i64>(0),
    );

    match result {
        Ok(id) => return Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => {}
        Err(e) => return Err(e.into()),
    }

    if let Ok(id) = reference.parse::<i64>() {
        if get_request(conn, id)?.is_some() {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

/// Conditional on `pending`; returns false when the request was already
/// decided, which the admin API surfaces as a 409.
pub fn decide_request(
    conn: &Connection,
    request_id: i64,
    actor: &str,
    decision: RequestStatus,
    note: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    debug_assert!(matches!(
        decision,
        RequestStatus::Approved | RequestStatus::Rejected
    ));

    let count = conn.execute(
        "UPDATE booking_requests
         SET status = ?1, admin_actor = ?2, decided_at = ?3, admin_note = ?4
         WHERE id = ?5 AND status = 'pending'",
        params![decision.as_str(), actor, fmt_ts(now), note, request_id],
    )?;
    Ok(count == 1)
}

/// Only an `approved` booking can be cancelled.
pub fn cancel_request(
    conn: &Connection,
    request_id: i64,
    actor: &str,
    note: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE booking_requests
         SET status = 'cancelled', admin_actor = ?1, decided_at = ?2, admin_note = ?3
         WHERE id = ?4 AND status = 'approved'",
        params![actor, fmt_ts(now), note, request_id],
    )?;
    Ok(count == 1)
}

pub fn list_pending_requests(conn: &Connection, limit: i64) -> anyhow::Result<Vec<BookingRequest>> {
    list_requests(conn, Some(RequestStatus::Pending), limit)
}

pub fn list_requests(
    conn: &Connection,
    status: Option<RequestStatus>,
    limit: i64,
) -> anyhow::Result<Vec<BookingRequest>> {
    let limit = limit.clamp(1, 200);

    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status {
        Some(status) => (
            "SELECT id, public_ref, created_at, channel_id, customer_id, service_key, service_label, \
                    start_at, end_at, status, admin_actor, decided_at, admin_note \
             FROM booking_requests WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2"
                .to_string(),
            vec![
                Box::new(status.as_str().to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            "SELECT id, public_ref, created_at, channel_id, customer_id, service_key, service_label, \
                    start_at, end_at, status, admin_actor, decided_at, admin_note \
             FROM booking_requests ORDER BY created_at DESC LIMIT ?1"
                .to_string(),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), parse_request_row)?;

    let mut requests = vec![];
    for row in rows {
        requests.push(row?);
    }
    Ok(requests)
}

/// Optional policy: pending requests the admin never acted on expire after
/// `max_age_minutes`, releasing their linked holds. Off unless configured.
pub fn expire_stale_requests(
    conn: &Connection,
    now: &NaiveDateTime,
    max_age_minutes: i64,
) -> anyhow::Result<usize> {
    let cutoff = fmt_ts(&(*now - Duration::minutes(max_age_minutes)));

    let mut stmt = conn.prepare(
        "SELECT id FROM booking_requests WHERE status = 'pending' AND created_at <= ?1",
    )?;
    let ids: Vec<i64> = stmt
        .query_map(params![cutoff], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    for id in &ids {
        conn.execute(
            "UPDATE booking_requests SET status = 'expired' WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        if let Some(hold_id) = find_hold_by_request(conn, *id)? {
            release_hold(conn, hold_id)?;
        }
    }
    Ok(ids.len())
}

fn parse_request_row(row: &rusqlite::Row) -> Result<BookingRequest, rusqlite::Error> {
    let status_s: String = row.get(9)?;
    Ok(BookingRequest {
        id: row.get(0)?,
        public_ref: row.get(1)?,
        created_at: parse_ts(&row.get::<_, String>(2)?)?,
        channel_id: row.get(3)?,
        customer_id: row.get(4)?,
        service_key: row.get(5)?,
        service_label: row.get(6)?,
        start_at: parse_ts(&row.get::<_, String>(7)?)?,
        end_at: parse_ts(&row.get::<_, String>(8)?)?,
        status: RequestStatus::parse(&status_s).unwrap_or(RequestStatus::Pending),
        admin_actor: row.get(10)?,
        decided_at: row
            .get::<_, Option<String>>(11)?
            .map(|s| parse_ts(&s))
            .transpose()?,
        admin_note: row.get(12)?,
    })
}

// ── Booking context ──

/// Merge, not overwrite: a field passed as `None` keeps whatever value the
/// row already carries. The TTL refreshes on every call.
pub fn upsert_booking_context(
    conn: &Connection,
    customer_id: &str,
    service_key: Option<&str>,
    service_label: Option<&str>,
    start_local: Option<&str>,
    ttl_minutes: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<()> {
    let expires = *now + Duration::minutes(ttl_minutes);
    conn.execute(
        "INSERT INTO booking_context
            (customer_id, updated_at, expires_at, pending_service_key, pending_service_label,
             pending_start_local)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(customer_id) DO UPDATE SET
           updated_at = excluded.updated_at,
           expires_at = excluded.expires_at,
           pending_service_key = COALESCE(excluded.pending_service_key, pending_service_key),
           pending_service_label = COALESCE(excluded.pending_service_label, pending_service_label),
           pending_start_local = COALESCE(excluded.pending_start_local, pending_start_local)",
        params![
            customer_id,
            fmt_ts(now),
            fmt_ts(&expires),
            service_key,
            service_label,
            start_local,
        ],
    )?;
    Ok(())
}

/// Returns None for a missing or expired row; an expired row is deleted on
/// the way out.
pub fn get_booking_context(
    conn: &Connection,
    customer_id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<BookingContext>> {
    let result = conn.query_row(
        "SELECT customer_id, updated_at, expires_at, pending_service_key, pending_service_label,
                pending_start_local
         FROM booking_context WHERE customer_id = ?1",
        params![customer_id],
        |row| {
            Ok(BookingContext {
                customer_id: row.get(0)?,
                updated_at: parse_ts(&row.get::<_, String>(1)?)?,
                expires_at: parse_ts(&row.get::<_, String>(2)?)?,
                pending_service_key: row.get(3)?,
                pending_service_label: row.get(4)?,
                pending_start_local: row.get(5)?,
            })
        },
    );

    match result {
        Ok(ctx) => {
            if ctx.expires_at <= *now {
                clear_booking_context(conn, customer_id)?;
                return Ok(None);
            }
            Ok(Some(ctx))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn clear_booking_context(conn: &Connection, customer_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM booking_context WHERE customer_id = ?1",
        params![customer_id],
    )?;
    Ok(())
}

/// Drops only the remembered start time, keeping the service. Used when a
/// stored time turned out to be unavailable or invalid.
pub fn clear_context_start(conn: &Connection, customer_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE booking_context SET pending_start_local = NULL WHERE customer_id = ?1",
        params![customer_id],
    )?;
    Ok(())
}
