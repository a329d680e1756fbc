//! Provider schedule database operations.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};
use crate::models::{HourWindow, ProviderSchedule};

impl Database {
    /// Insert or replace a provider and its weekly template.
    pub fn upsert_provider(&self, provider: &ProviderSchedule) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO providers (
                provider_id, name, specialty, location,
                working_start, working_end, lunch_start, lunch_end
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(provider_id) DO UPDATE SET
                name = excluded.name,
                specialty = excluded.specialty,
                location = excluded.location,
                working_start = excluded.working_start,
                working_end = excluded.working_end,
                lunch_start = excluded.lunch_start,
                lunch_end = excluded.lunch_end
            "#,
            params![
                provider.provider_id,
                provider.name,
                provider.specialty,
                provider.location,
                provider.working_hours.start,
                provider.working_hours.end,
                provider.lunch_break.start,
                provider.lunch_break.end,
            ],
        )?;

        self.conn.execute(
            "DELETE FROM provider_hours WHERE provider_id = ?1",
            params![provider.provider_id],
        )?;

        let mut stmt = self.conn.prepare(
            "INSERT INTO provider_hours (provider_id, weekday, hour) VALUES (?1, ?2, ?3)",
        )?;
        for (weekday, hours) in &provider.weekly_hours {
            for hour in hours {
                stmt.execute(params![provider.provider_id, weekday, hour])?;
            }
        }

        Ok(())
    }

    /// Get a provider's schedule with its weekly template.
    pub fn get_provider_schedule(&self, provider_id: &str) -> DbResult<Option<ProviderSchedule>> {
        let provider = self
            .conn
            .query_row(
                r#"
                SELECT provider_id, name, specialty, location,
                       working_start, working_end, lunch_start, lunch_end
                FROM providers WHERE provider_id = ?1
                "#,
                params![provider_id],
                |row| {
                    Ok(ProviderSchedule {
                        provider_id: row.get(0)?,
                        name: row.get(1)?,
                        specialty: row.get(2)?,
                        location: row.get(3)?,
                        weekly_hours: BTreeMap::new(),
                        working_hours: HourWindow::new(row.get(4)?, row.get(5)?),
                        lunch_break: HourWindow::new(row.get(6)?, row.get(7)?),
                    })
                },
            )
            .optional()?;

        let Some(mut provider) = provider else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT weekday, hour FROM provider_hours
            WHERE provider_id = ?1
            ORDER BY weekday, hour
            "#,
        )?;
        let rows = stmt.query_map(params![provider_id], |row| {
            Ok((row.get::<_, u8>(0)?, row.get::<_, u8>(1)?))
        })?;
        for row in rows {
            let (weekday, hour) = row?;
            provider
                .weekly_hours
                .entry(weekday)
                .or_insert_with(BTreeSet::new)
                .insert(hour);
        }

        Ok(Some(provider))
    }

    /// List all providers, by ID.
    pub fn list_providers(&self) -> DbResult<Vec<ProviderSchedule>> {
        self.list_providers_by(None, None)
    }

    /// Providers whose specialty and location contain the given fragments,
    /// case-insensitively. `None` matches everything.
    pub fn list_providers_by(
        &self,
        specialty: Option<&str>,
        location: Option<&str>,
    ) -> DbResult<Vec<ProviderSchedule>> {
        let ids: Vec<String> = self
            .conn
            .prepare(
                r#"
                SELECT provider_id FROM providers
                WHERE (?1 IS NULL OR instr(lower(specialty), lower(?1)) > 0)
                  AND (?2 IS NULL OR instr(lower(location), lower(?2)) > 0)
                ORDER BY provider_id
                "#,
            )?
            .query_map(params![specialty, location], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let mut providers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(provider) = self.get_provider_schedule(&id)? {
                providers.push(provider);
            }
        }
        Ok(providers)
    }
}
