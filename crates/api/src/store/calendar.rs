//! Upstream-backed calendar store
//!
//! Binds WebDAV object paths to upstream event keys and occurrence ids, and
//! owns the listing/get/put/delete semantics of the single calendar.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use davgate_core::model::{EventMode, UpstreamEvent};
use davgate_core::{ObjectName, translate};
use davgate_upstream::UpstreamClient;

use crate::config::ListingMode;
use crate::dav::Preconditions;
use crate::error::ApiError;
use crate::CALENDAR_PATH;

/// Window used to locate an occurrence whose concrete instant is unknown
const OCCURRENCE_LOOKUP_WEEKS: i64 = 52;

/// A calendar object as served over WebDAV
#[derive(Debug, Clone)]
pub struct CalendarObject {
    pub path: String,
    pub data: String,
    pub etag: String,
}

impl CalendarObject {
    fn new(path: String, data: String) -> Self {
        let etag = translate::etag(&data);
        CalendarObject { path, data, etag }
    }

    pub fn content_length(&self) -> usize {
        self.data.len()
    }
}

/// Result of a calendar object PUT
#[derive(Debug)]
pub struct PutOutcome {
    pub object: CalendarObject,
    pub created: bool,
}

/// Read-write store over the upstream's single logical calendar
#[derive(Clone)]
pub struct CalendarStore {
    upstream: Arc<UpstreamClient>,
    listing_mode: ListingMode,
    sync_weeks: i64,
}

impl CalendarStore {
    pub fn new(upstream: Arc<UpstreamClient>, listing_mode: ListingMode, sync_weeks: i64) -> Self {
        CalendarStore {
            upstream,
            listing_mode,
            sync_weeks,
        }
    }

    fn tz(&self) -> Tz {
        self.upstream.config().server_timezone
    }

    fn owner_key(&self) -> &str {
        &self.upstream.config().owner_key
    }

    /// Default listing window around now
    pub fn sync_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (
            now - Duration::weeks(self.sync_weeks),
            now + Duration::weeks(self.sync_weeks),
        )
    }

    /// List the calendar's objects within a window (default: sync window)
    pub async fn list_objects(
        &self,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<CalendarObject>, ApiError> {
        self.list_objects_for_owner(self.owner_key(), window).await
    }

    /// Listing for an explicit owner key (used by the ICS feed)
    pub async fn list_objects_for_owner(
        &self,
        owner_key: &str,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<CalendarObject>, ApiError> {
        let (start, end) = window.unwrap_or_else(|| self.sync_window());
        let page = self
            .upstream
            .get_event_occurrences(owner_key, start, end, 0, 1000)
            .await?;

        match self.listing_mode {
            ListingMode::Series => self.list_as_series(&page.calendar_events).await,
            ListingMode::Occurrence => Ok(Self::list_as_occurrences(&page.calendar_events)),
        }
    }

    /// Series listing: deduplicate by event key, one object per series with
    /// its synthesized RRULE
    async fn list_as_series(
        &self,
        records: &[UpstreamEvent],
    ) -> Result<Vec<CalendarObject>, ApiError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut objects = Vec::new();

        for record in records {
            let Some(key) = record.key.clone().filter(|k| !k.is_empty()) else {
                continue;
            };
            if !seen.insert(key.clone()) {
                continue;
            }

            // Listing records carry no seriesSchema; series need the full
            // event record to synthesize their RRULE
            let translated = if record.occurrence_id.is_none()
                && record.event_mode == EventMode::Single
            {
                translate::occurrence_to_ics(record)
            } else {
                match self.upstream.get_event(&key).await {
                    Ok(full) => translate::event_to_ics(&full, self.tz()),
                    Err(err) if err.is_not_found() => {
                        tracing::warn!("event {key} vanished between listing and fetch");
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            };

            match translated {
                Ok(ics) => {
                    objects.push(CalendarObject::new(format!("{CALENDAR_PATH}{key}.ics"), ics));
                }
                Err(err) => {
                    tracing::warn!("skipping untranslatable event {key}: {err}");
                }
            }
        }

        Ok(objects)
    }

    /// Occurrence listing: every instance is a standalone object named
    /// `<key>-<occurrenceId>.ics`, no RRULE
    fn list_as_occurrences(records: &[UpstreamEvent]) -> Vec<CalendarObject> {
        let mut objects = Vec::new();
        for record in records {
            let Some(key) = record.key.clone().filter(|k| !k.is_empty()) else {
                continue;
            };
            let stem = match &record.occurrence_id {
                Some(occ) => format!("{key}-{occ}"),
                None => key.clone(),
            };
            match translate::occurrence_to_ics(record) {
                Ok(ics) => {
                    objects.push(CalendarObject::new(format!("{CALENDAR_PATH}{stem}.ics"), ics));
                }
                Err(err) => {
                    tracing::warn!("skipping untranslatable occurrence {stem}: {err}");
                }
            }
        }
        objects
    }

    /// Fetch one object by parsed identity
    ///
    /// The whole stem is tried as an event key first, so hyphenated
    /// client identifiers resolve to their event; only on upstream 404 does
    /// the occurrence-candidate split apply.
    pub async fn get_object(&self, name: &ObjectName) -> Result<CalendarObject, ApiError> {
        let stem = name.stem();
        match self.upstream.get_event(&stem).await {
            Ok(full) => {
                let ics = translate::event_to_ics(&full, self.tz())?;
                Ok(CalendarObject::new(format!("{CALENDAR_PATH}{stem}.ics"), ics))
            }
            Err(err) if err.is_not_found() && name.occurrence.is_some() => {
                self.get_occurrence_object(name).await
            }
            Err(err) if err.is_not_found() => {
                Err(ApiError::NotFound(format!("no event for {stem}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_occurrence_object(&self, name: &ObjectName) -> Result<CalendarObject, ApiError> {
        let occurrence = name.occurrence.as_deref().unwrap_or_default();
        let now = Utc::now();
        let page = self
            .upstream
            .get_event_occurrences(
                self.owner_key(),
                now - Duration::weeks(OCCURRENCE_LOOKUP_WEEKS),
                now + Duration::weeks(OCCURRENCE_LOOKUP_WEEKS),
                0,
                1000,
            )
            .await?;

        let record = page
            .calendar_events
            .iter()
            .find(|r| {
                r.key.as_deref() == Some(name.key.as_str())
                    && r.occurrence_id.as_deref() == Some(occurrence)
            })
            .ok_or_else(|| {
                ApiError::NotFound(format!("no occurrence {occurrence} of {}", name.key))
            })?;

        let ics = translate::occurrence_to_ics(record)?;
        Ok(CalendarObject::new(
            format!("{CALENDAR_PATH}{}.ics", name.stem()),
            ics,
        ))
    }

    /// Create or update an event from a client body
    ///
    /// Occurrence-form paths are rejected before anything is asked of the
    /// upstream: create/modify/delete apply to whole series only. On create
    /// the upstream assigns the key and the resource relocates to
    /// `<calendar>/<new-key>.ics`.
    pub async fn put_object(
        &self,
        name: &ObjectName,
        body: &str,
        preconditions: &Preconditions,
    ) -> Result<PutOutcome, ApiError> {
        reject_occurrence_path(name, "modification")?;
        let stem = name.stem();

        let inbound = translate::ics_to_event(body, self.tz())?;

        let existing = match self.upstream.get_event(&stem).await {
            Ok(event) => Some(event),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };

        if preconditions.if_match.is_some() || preconditions.if_none_match.is_some() {
            let current_etag = match &existing {
                Some(event) => {
                    let ics = translate::event_to_ics(event, self.tz())?;
                    Some(translate::etag(&ics))
                }
                None => None,
            };
            preconditions.evaluate(current_etag.as_deref())?;
        }

        let mut draft = inbound.event;
        draft.owner_key = Some(self.owner_key().to_string());

        let (final_key, created) = if existing.is_some() {
            self.upstream.update_event(&stem, &draft).await?;
            (stem, false)
        } else {
            let created_event = self.upstream.create_event(&draft).await?;
            (created_event.key.unwrap_or(stem), true)
        };

        // Read back so the client sees the ETag of what the upstream
        // actually stored
        let full = self.upstream.get_event(&final_key).await?;
        let ics = translate::event_to_ics(&full, self.tz())?;
        let object = CalendarObject::new(format!("{CALENDAR_PATH}{final_key}.ics"), ics);

        Ok(PutOutcome { object, created })
    }

    /// Delete an event (the whole series for serial events)
    pub async fn delete_object(&self, name: &ObjectName) -> Result<(), ApiError> {
        reject_occurrence_path(name, "deletion")?;
        self.upstream.delete_event(&name.stem()).await?;
        Ok(())
    }
}

/// 405 on any occurrence-form path. Purely syntactic: no upstream call is
/// made before the rejection.
fn reject_occurrence_path(name: &ObjectName, verb: &str) -> Result<(), ApiError> {
    if name.occurrence.is_some() {
        return Err(ApiError::MethodNotAllowed(format!(
            "per-occurrence {verb} not supported; apply changes to the whole series"
        )));
    }
    Ok(())
}
