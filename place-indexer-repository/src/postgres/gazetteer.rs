//! PostgreSQL implementation of the gazetteer source.
//!
//! Reads a Nominatim-style schema: subject rows from `placex`, ancestor chains through
//! `get_addressdata()`, the change log from `place_changes` and reverse address links
//! from `place_addressline`.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use place_indexer_shared::types::names::normalize_gazetteer_names;
use place_indexer_shared::{
    AddressRow, BoundingBox, Centroid, CountryFilter, Names, OsmType, PlaceRow, UpdateMarker,
};

use crate::errors::GazetteerError;
use crate::interfaces::GazetteerSource;
use crate::types::{AddressChains, DeltaScan, PlacePage};

const SUBJECT_COLUMNS: &str = "\
    place_id, \
    osm_type::text AS osm_type, \
    osm_id, \
    class AS osm_key, \
    type AS osm_value, \
    rank_address::int4 AS rank_address, \
    hstore_to_json(name) AS names, \
    housenumber, \
    postcode, \
    country_code::text AS country_code, \
    ST_Y(centroid) AS lat, \
    ST_X(centroid) AS lon, \
    COALESCE(importance, 0)::float8 AS importance, \
    CASE WHEN ST_GeometryType(geometry) = 'ST_Point' THEN NULL ELSE ST_YMin(geometry) END AS min_lat, \
    CASE WHEN ST_GeometryType(geometry) = 'ST_Point' THEN NULL ELSE ST_XMin(geometry) END AS min_lon, \
    CASE WHEN ST_GeometryType(geometry) = 'ST_Point' THEN NULL ELSE ST_YMax(geometry) END AS max_lat, \
    CASE WHEN ST_GeometryType(geometry) = 'ST_Point' THEN NULL ELSE ST_XMax(geometry) END AS max_lon";

/// Batches at least this large are checked for a column that fails on every row.
const SCHEMA_CHECK_MIN_ROWS: usize = 8;

const SUBJECT_FILTER: &str = "linked_place_id IS NULL AND centroid IS NOT NULL";

const ADDRESS_CHAINS_SQL: &str = "\
    SELECT s.subject_id, \
           COALESCE(a.place_id, 0) AS place_id, \
           hstore_to_json(a.name) AS names, \
           a.class AS osm_key, \
           a.type AS osm_value, \
           a.rank_address::int4 AS rank_address \
    FROM unnest($1::bigint[]) AS s(subject_id) \
    CROSS JOIN LATERAL get_addressdata(s.subject_id, -1) AS a \
    WHERE a.isaddress AND a.place_id IS DISTINCT FROM s.subject_id \
    ORDER BY s.subject_id, a.rank_address DESC, a.place_id";

const CURRENT_MARKER_SQL: &str = "SELECT COALESCE(MAX(seq), 0)::int8 AS seq FROM place_changes";

const CHANGES_SQL: &str = "\
    SELECT seq, place_id, deleted FROM place_changes WHERE seq > $1 ORDER BY seq";

const DEPENDENTS_SQL: &str = "\
    SELECT DISTINCT place_id FROM place_addressline \
    WHERE address_place_id = ANY($1) AND isaddress \
    ORDER BY place_id";

/// Keyset-paginated full scan query, optionally restricted by country.
pub fn subject_page_sql(with_country_filter: bool) -> String {
    let country = if with_country_filter {
        " AND country_code = ANY($3)"
    } else {
        ""
    };
    format!(
        "SELECT {} FROM placex WHERE {} AND place_id > $1{} ORDER BY place_id LIMIT $2",
        SUBJECT_COLUMNS, SUBJECT_FILTER, country
    )
}

/// Lookup of specific subject rows.
pub fn subject_lookup_sql() -> String {
    format!(
        "SELECT {} FROM placex WHERE {} AND place_id = ANY($1) ORDER BY place_id",
        SUBJECT_COLUMNS, SUBJECT_FILTER
    )
}

/// Turn the JSON form of an hstore name column into normalised names.
pub fn names_from_json(value: Option<Value>) -> Names {
    match value {
        Some(Value::Object(map)) => normalize_gazetteer_names(
            map.into_iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string()))),
        ),
        _ => Names::new(),
    }
}

/// Collapse raw change log entries (ascending `seq`) into a delta: per place the last
/// entry wins.
pub fn collapse_changes(entries: &[(i64, i64, bool)], since: UpdateMarker) -> DeltaScan {
    let mut latest: BTreeMap<i64, bool> = BTreeMap::new();
    let mut new_marker = since;

    for &(seq, place_id, deleted) in entries {
        latest.insert(place_id, deleted);
        if seq > new_marker.sequence() {
            new_marker = UpdateMarker(seq);
        }
    }

    let mut changed = BTreeSet::new();
    let mut removed = BTreeSet::new();
    for (place_id, deleted) in latest {
        if deleted {
            removed.insert(place_id);
        } else {
            changed.insert(place_id);
        }
    }

    DeltaScan {
        changed,
        deleted: removed,
        new_marker,
    }
}

fn decode_error(place_id: Option<i64>, column: &str, err: sqlx::Error) -> GazetteerError {
    GazetteerError::column_decode(place_id, column, format!("column {}: {}", column, err))
}

/// Decode one `placex` row.
fn decode_place_row(row: &PgRow) -> Result<PlaceRow, GazetteerError> {
    let place_id: i64 = row
        .try_get("place_id")
        .map_err(|e| decode_error(None, "place_id", e))?;
    let id = Some(place_id);

    let osm_type_code: String = row
        .try_get("osm_type")
        .map_err(|e| decode_error(id, "osm_type", e))?;
    let osm_type = OsmType::from_code(&osm_type_code).ok_or_else(|| {
        GazetteerError::row_decode(id, format!("unknown osm_type '{}'", osm_type_code))
    })?;

    let lat: f64 = row.try_get("lat").map_err(|e| decode_error(id, "lat", e))?;
    let lon: f64 = row.try_get("lon").map_err(|e| decode_error(id, "lon", e))?;
    let centroid = Centroid::new(lat, lon);
    if !centroid.is_valid() {
        return Err(GazetteerError::row_decode(
            id,
            format!("centroid out of range: {}, {}", lat, lon),
        ));
    }

    let bbox = match (
        row.try_get::<Option<f64>, _>("min_lat"),
        row.try_get::<Option<f64>, _>("min_lon"),
        row.try_get::<Option<f64>, _>("max_lat"),
        row.try_get::<Option<f64>, _>("max_lon"),
    ) {
        (Ok(Some(min_lat)), Ok(Some(min_lon)), Ok(Some(max_lat)), Ok(Some(max_lon))) => {
            Some(BoundingBox {
                min_lat,
                min_lon,
                max_lat,
                max_lon,
            })
        }
        _ => None,
    };

    Ok(PlaceRow {
        place_id,
        osm_type,
        osm_id: row.try_get("osm_id").map_err(|e| decode_error(id, "osm_id", e))?,
        osm_key: row.try_get("osm_key").map_err(|e| decode_error(id, "osm_key", e))?,
        osm_value: row
            .try_get("osm_value")
            .map_err(|e| decode_error(id, "osm_value", e))?,
        rank_address: row
            .try_get("rank_address")
            .map_err(|e| decode_error(id, "rank_address", e))?,
        names: names_from_json(
            row.try_get("names")
                .map_err(|e| decode_error(id, "names", e))?,
        ),
        house_number: row
            .try_get("housenumber")
            .map_err(|e| decode_error(id, "housenumber", e))?,
        postcode: row
            .try_get("postcode")
            .map_err(|e| decode_error(id, "postcode", e))?,
        country_code: row
            .try_get("country_code")
            .map_err(|e| decode_error(id, "country_code", e))?,
        centroid,
        importance: row
            .try_get("importance")
            .map_err(|e| decode_error(id, "importance", e))?,
        bbox,
    })
}

/// Decode one ancestor row, returning the subject it belongs to.
fn decode_address_row(row: &PgRow) -> Result<(i64, AddressRow), GazetteerError> {
    let subject_id: i64 = row
        .try_get("subject_id")
        .map_err(|e| decode_error(None, "subject_id", e))?;
    let id = Some(subject_id);

    let address = AddressRow::new(
        row.try_get("place_id")
            .map_err(|e| decode_error(id, "place_id", e))?,
        names_from_json(
            row.try_get("names")
                .map_err(|e| decode_error(id, "names", e))?,
        ),
        row.try_get::<String, _>("osm_key")
            .map_err(|e| decode_error(id, "osm_key", e))?,
        row.try_get::<String, _>("osm_value")
            .map_err(|e| decode_error(id, "osm_value", e))?,
        row.try_get("rank_address")
            .map_err(|e| decode_error(id, "rank_address", e))?,
    );
    Ok((subject_id, address))
}

/// The column that failed on every row of a batch of `total` rows, if there is one and
/// the batch is large enough to tell a schema problem from bad data.
fn column_failing_everywhere(errors: &[GazetteerError], total: usize) -> Option<&str> {
    if total < SCHEMA_CHECK_MIN_ROWS || errors.len() != total {
        return None;
    }
    let first = errors.first()?.decode_column()?;
    errors
        .iter()
        .all(|e| e.decode_column() == Some(first))
        .then_some(first)
}

/// Assemble a page from decoded subject rows, each paired with its `place_id` if readable.
///
/// Bad rows are skipped and counted. The page is only rejected when the failures point at
/// the schema: no row has a readable `place_id` (the scan could not advance), or a batch of
/// at least [`SCHEMA_CHECK_MIN_ROWS`] rows fails on the same column everywhere.
pub fn assemble_page(
    decoded: Vec<(Option<i64>, Result<PlaceRow, GazetteerError>)>,
) -> Result<PlacePage, GazetteerError> {
    let total = decoded.len();
    let mut page = PlacePage::default();
    let mut errors = Vec::new();

    for (place_id, result) in decoded {
        if let Some(id) = place_id {
            page.last_place_id = Some(page.last_place_id.map_or(id, |last| last.max(id)));
        }

        match result {
            Ok(place) => page.rows.push(place),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable place row");
                page.skipped += 1;
                page.skipped_ids.extend(place_id);
                errors.push(e);
            }
        }
    }

    if total > 0 && page.last_place_id.is_none() {
        return Err(GazetteerError::structural("place rows have no readable place_id"));
    }
    if let Some(column) = column_failing_everywhere(&errors, total) {
        return Err(GazetteerError::structural(format!(
            "column {} failed on all {} place rows",
            column, total
        )));
    }

    Ok(page)
}

/// Assemble ancestor chains from decoded address rows, in query order.
///
/// A row whose subject cannot be read belongs to no chain, which only happens when the
/// schema is off. Any other failure marks the subject's chain as incomplete.
pub fn assemble_chains(
    decoded: Vec<Result<(i64, AddressRow), GazetteerError>>,
) -> Result<AddressChains, GazetteerError> {
    let total = decoded.len();
    let mut chains = AddressChains::default();
    let mut errors = Vec::new();

    for result in decoded {
        match result {
            Ok((subject_id, address)) => {
                chains.chains.entry(subject_id).or_default().push(address)
            }
            Err(e) => {
                let subject_id = match &e {
                    GazetteerError::RowDecode {
                        place_id: Some(id), ..
                    } => *id,
                    _ => {
                        return Err(GazetteerError::structural(format!(
                            "address row without subject: {}",
                            e
                        )))
                    }
                };
                warn!(error = %e, subject_id, "Skipping subject with undecodable ancestor row");
                chains.incomplete.insert(subject_id);
                errors.push(e);
            }
        }
    }

    if let Some(column) = column_failing_everywhere(&errors, total) {
        return Err(GazetteerError::structural(format!(
            "column {} failed on all {} address rows",
            column, total
        )));
    }

    for subject_id in &chains.incomplete {
        chains.chains.remove(subject_id);
    }
    Ok(chains)
}

fn decode_page(rows: &[PgRow]) -> Result<PlacePage, GazetteerError> {
    assemble_page(
        rows.iter()
            .map(|row| (row.try_get::<i64, _>("place_id").ok(), decode_place_row(row)))
            .collect(),
    )
}

/// PostgreSQL-backed gazetteer source.
pub struct PostgresGazetteer {
    /// PostgreSQL connection pool
    pool: PgPool,
}

impl PostgresGazetteer {
    /// Creates a new gazetteer source on an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GazetteerSource for PostgresGazetteer {
    async fn read_places(
        &self,
        filter: &CountryFilter,
        after: Option<i64>,
        limit: usize,
    ) -> Result<PlacePage, GazetteerError> {
        let sql = subject_page_sql(!filter.is_empty());
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut query = sqlx::query(&sql).bind(after.unwrap_or(i64::MIN)).bind(limit);
        if !filter.is_empty() {
            query = query.bind(filter.codes().to_vec());
        }

        let rows = query.fetch_all(&self.pool).await?;
        let page = decode_page(&rows)?;

        debug!(
            after = ?after,
            rows = page.rows.len(),
            skipped = page.skipped,
            "Read place page"
        );
        Ok(page)
    }

    async fn fetch_places(&self, place_ids: &[i64]) -> Result<PlacePage, GazetteerError> {
        if place_ids.is_empty() {
            return Ok(PlacePage::default());
        }

        let rows = sqlx::query(&subject_lookup_sql())
            .bind(place_ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        decode_page(&rows)
    }

    async fn address_chains(&self, place_ids: &[i64]) -> Result<AddressChains, GazetteerError> {
        if place_ids.is_empty() {
            return Ok(AddressChains::default());
        }

        let rows = sqlx::query(ADDRESS_CHAINS_SQL)
            .bind(place_ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        assemble_chains(rows.iter().map(decode_address_row).collect())
    }

    async fn current_marker(&self) -> Result<UpdateMarker, GazetteerError> {
        let row = sqlx::query(CURRENT_MARKER_SQL)
            .fetch_one(&self.pool)
            .await?;
        let seq: i64 = row
            .try_get("seq")
            .map_err(|e| GazetteerError::structural(format!("place_changes.seq: {}", e)))?;
        Ok(UpdateMarker(seq))
    }

    async fn read_changes(&self, since: UpdateMarker) -> Result<DeltaScan, GazetteerError> {
        let rows = sqlx::query(CHANGES_SQL)
            .bind(since.sequence())
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let entry = (
                row.try_get::<i64, _>("seq"),
                row.try_get::<i64, _>("place_id"),
                row.try_get::<bool, _>("deleted"),
            );
            match entry {
                (Ok(seq), Ok(place_id), Ok(deleted)) => entries.push((seq, place_id, deleted)),
                _ => {
                    // Skipping a change would silently lose it once the marker moves past it.
                    return Err(GazetteerError::structural(
                        "place_changes row with missing columns",
                    ));
                }
            }
        }

        Ok(collapse_changes(&entries, since))
    }

    async fn find_dependents(&self, ancestor_ids: &[i64]) -> Result<Vec<i64>, GazetteerError> {
        if ancestor_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(DEPENDENTS_SQL)
            .bind(ancestor_ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                row.try_get::<i64, _>("place_id")
                    .map_err(|e| GazetteerError::structural(format!("place_addressline: {}", e)))
            })
            .collect()
    }
}
