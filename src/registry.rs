//! Read-only query layer over the registry database.
//!
//! Every function issues parameterized queries against the SQLite store and
//! returns plain value records. Store errors are passed through to the
//! caller unchanged; nothing here retries.

use std::error::Error;

use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use rocket_sync_db_pools::database;

use crate::models::*;

type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Pooled connection handed to Rocket request handlers
#[database("registry")]
pub(crate) struct RegistryDb(diesel::SqliteConnection);

/// Chunk size for `IN`-clause queries over sample accessions.
/// SQLITE_MAX_VARIABLE_NUMBER caps bound parameters at 999 per statement.
pub const ANNOTATION_CHUNK_SIZE: usize = 500;

pub fn establish_connection(url: &str) -> Result<SqliteConnection> {
    Ok(SqliteConnection::establish(url)?)
}

/// Create the registry tables and reporting views in an empty database
pub fn initialize(conn: &SqliteConnection) -> Result<()> {
    use diesel::connection::SimpleConnection;
    conn.batch_execute(include_str!("../db/schema.sql"))?;
    Ok(())
}

/* Runs */

pub fn runs(conn: &SqliteConnection) -> QueryResult<Vec<RunSampleCount>> {
    use crate::schema::runs_samplecounts;
    runs_samplecounts::table.load(conn)
}

pub fn run(conn: &SqliteConnection, accession: i32) -> QueryResult<Option<Run>> {
    use crate::schema::runs;
    runs::table.find(accession).first(conn).optional()
}

pub fn run_samples(conn: &SqliteConnection, accession: i32) -> QueryResult<Vec<Sample>> {
    use crate::schema::samples;
    samples::table
        .filter(samples::run_accession.eq(accession))
        .order((samples::sample_name.asc(), samples::sample_accession.asc()))
        .load(conn)
}

/* Samples */

pub fn sample(conn: &SqliteConnection, accession: i32) -> QueryResult<Option<SampleDetail>> {
    use crate::schema::runs_samples;
    runs_samples::table.find(accession).first(conn).optional()
}

pub fn samples_list(conn: &SqliteConnection, accessions: &[i32]) -> QueryResult<Vec<SampleDetail>> {
    use crate::schema::runs_samples;
    if accessions.is_empty() {
        return Ok(Vec::new());
    }
    runs_samples::table
        .filter(runs_samples::sample_accession.eq_any(accessions))
        .load(conn)
}

pub fn sample_match(conn: &SqliteConnection, partial_name: &str) -> QueryResult<Vec<SampleDetail>> {
    use crate::schema::runs_samples;
    runs_samples::table
        .filter(runs_samples::sample_name.like(format!("{}%", partial_name)))
        .load(conn)
}

/* Annotations */

pub fn sample_annotations(conn: &SqliteConnection, accession: i32) -> QueryResult<Vec<Annotation>> {
    use crate::schema::annotations;
    annotations::table
        .filter(annotations::sample_accession.eq(accession))
        .load(conn)
}

/// Load annotations for a set of samples.
///
/// The accession set is split into chunks of [`ANNOTATION_CHUNK_SIZE`] and
/// one query is issued per chunk, so the statement never runs into the
/// store's bound-parameter ceiling. Results are concatenated in chunk
/// order. An empty accession set returns immediately without a query.
pub fn annotations_for_samples(
    conn: &SqliteConnection,
    accessions: &[i32],
) -> QueryResult<Vec<Annotation>> {
    use crate::schema::annotations;
    if accessions.is_empty() {
        return Ok(Vec::new());
    }
    let mut rows: Vec<Annotation> = Vec::new();
    for chunk in accessions.chunks(ANNOTATION_CHUNK_SIZE) {
        let mut chunk_rows = annotations::table
            .filter(annotations::sample_accession.eq_any(chunk))
            .load(conn)?;
        rows.append(&mut chunk_rows);
    }
    Ok(rows)
}

/* Tags */

/// The standard tags are promoted to dedicated columns on the samples table
pub fn standard_tag_column(tag: &str) -> Option<&'static str> {
    match tag {
        "SampleType" => Some("sample_type"),
        "HostSpecies" => Some("host_species"),
        "SubjectID" => Some("subject_id"),
        _ => None,
    }
}

pub fn tags(conn: &SqliteConnection) -> QueryResult<Vec<TagCount>> {
    use crate::schema::annotation_keys;
    annotation_keys::table.load(conn)
}

pub fn tag_stats(conn: &SqliteConnection, tag: &str) -> QueryResult<Vec<TagRunStat>> {
    use crate::schema::annotation_vals_by_run;
    annotation_vals_by_run::table
        .filter(annotation_vals_by_run::key.eq(tag))
        .load(conn)
}

/// Per-run value breakdown for a standard tag, read from its sample column
pub fn standard_tag_stats(
    conn: &SqliteConnection,
    tag: &str,
    column: &str,
) -> QueryResult<Vec<TagRunStat>> {
    diesel::sql_query(format!(
        "SELECT ? AS \"key\", samples.{col} AS val, \
         COUNT(samples.sample_accession) AS sample_count, \
         runs.run_accession AS run_accession, runs.run_date AS run_date, \
         runs.comment AS run_comment \
         FROM samples JOIN runs ON samples.run_accession = runs.run_accession \
         WHERE samples.{col} IS NOT NULL \
         GROUP BY samples.{col}, samples.run_accession",
        col = column
    ))
    .bind::<Text, _>(tag)
    .load(conn)
}

pub fn tag_value(conn: &SqliteConnection, tag: &str, value: &str) -> QueryResult<Vec<Annotation>> {
    use crate::schema::annotations;
    annotations::table
        .filter(annotations::key.eq(tag))
        .filter(annotations::val.eq(value))
        .load(conn)
}

pub fn standard_tag_value(
    conn: &SqliteConnection,
    column: &str,
    value: &str,
) -> QueryResult<Vec<SampleDetail>> {
    diesel::sql_query(format!("SELECT * FROM runs_samples WHERE {} = ?", column))
        .bind::<Text, _>(value)
        .load(conn)
}

/* Stats */

fn scalar_count(conn: &SqliteConnection, sql: &str) -> QueryResult<i64> {
    let row: CountRow = diesel::sql_query(sql).get_result(conn)?;
    Ok(row.n)
}

/// Collect the metadata completeness numbers for the stats dashboard
pub fn stats(conn: &SqliteConnection) -> QueryResult<RegistryStats> {
    use crate::schema::samples;

    let num_samples = samples::table.count().get_result(conn)?;

    let num_sampletype = samples::table
        .filter(samples::sample_type.is_not_null())
        .count()
        .get_result(conn)?;
    let num_standard_sampletype = scalar_count(
        conn,
        "SELECT COUNT(samples.sample_accession) AS n FROM samples \
         JOIN standard_sample_types \
         ON samples.sample_type = standard_sample_types.sample_type",
    )?;
    let standard_sampletype_counts = diesel::sql_query(
        "SELECT standard_sample_types.sample_type AS val, \
         COUNT(samples.sample_accession) AS num_samples \
         FROM standard_sample_types \
         LEFT OUTER JOIN samples \
         ON standard_sample_types.sample_type = samples.sample_type \
         GROUP BY standard_sample_types.sample_type \
         ORDER BY num_samples DESC",
    )
    .load(conn)?;
    let nonstandard_sampletype_counts = diesel::sql_query(
        "SELECT samples.sample_type AS val, \
         COUNT(samples.sample_accession) AS num_samples \
         FROM samples \
         LEFT OUTER JOIN standard_sample_types \
         ON samples.sample_type = standard_sample_types.sample_type \
         WHERE standard_sample_types.sample_type IS NULL \
         GROUP BY samples.sample_type \
         ORDER BY num_samples DESC",
    )
    .load(conn)?;

    let num_subjectid = samples::table
        .filter(samples::subject_id.is_not_null())
        .count()
        .get_result(conn)?;
    let num_subjectid_with_hostspecies = samples::table
        .filter(samples::subject_id.is_not_null())
        .filter(samples::host_species.is_not_null())
        .count()
        .get_result(conn)?;

    let num_hostspecies = samples::table
        .filter(samples::host_species.is_not_null())
        .count()
        .get_result(conn)?;
    let num_standard_hostspecies = scalar_count(
        conn,
        "SELECT COUNT(samples.sample_accession) AS n FROM samples \
         JOIN standard_host_species \
         ON samples.host_species = standard_host_species.host_species",
    )?;
    let standard_hostspecies_counts = diesel::sql_query(
        "SELECT standard_host_species.host_species AS val, \
         COUNT(samples.sample_accession) AS num_samples \
         FROM standard_host_species \
         LEFT OUTER JOIN samples \
         ON standard_host_species.host_species = samples.host_species \
         GROUP BY standard_host_species.host_species \
         ORDER BY num_samples DESC",
    )
    .load(conn)?;
    let nonstandard_hostspecies_counts = diesel::sql_query(
        "SELECT samples.host_species AS val, \
         COUNT(samples.sample_accession) AS num_samples \
         FROM samples \
         LEFT OUTER JOIN standard_host_species \
         ON samples.host_species = standard_host_species.host_species \
         WHERE standard_host_species.host_species IS NULL \
         AND samples.host_species IS NOT NULL \
         GROUP BY samples.host_species \
         ORDER BY num_samples DESC",
    )
    .load(conn)?;

    let num_primer = samples::table
        .filter(samples::primer_sequence.ne(""))
        .count()
        .get_result(conn)?;
    let num_reverse_primer = scalar_count(
        conn,
        "SELECT COUNT(DISTINCT sample_accession) AS n FROM annotations \
         WHERE \"key\" = 'ReversePrimerSequence'",
    )?;

    Ok(RegistryStats {
        num_samples,
        num_sampletype,
        num_standard_sampletype,
        standard_sampletype_counts,
        nonstandard_sampletype_counts,
        num_subjectid,
        num_subjectid_with_hostspecies,
        num_hostspecies,
        num_standard_hostspecies,
        standard_hostspecies_counts,
        nonstandard_hostspecies_counts,
        num_primer,
        num_reverse_primer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{annotations, runs, samples, standard_host_species, standard_sample_types};
    use chrono::NaiveDate;

    fn test_db() -> SqliteConnection {
        let conn = SqliteConnection::establish(":memory:").unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn insert_run(conn: &SqliteConnection, accession: i32, comment: &str) {
        let run = Run {
            run_accession: accession,
            run_date: NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
            lane: 1,
            machine_type: String::from("GS-Junior"),
            machine_kit: String::from("Titanium"),
            comment: comment.to_string(),
            data_uri: String::from("runs/run.sff"),
        };
        diesel::insert_into(runs::table)
            .values(&run)
            .execute(conn)
            .unwrap();
    }

    fn insert_sample(conn: &SqliteConnection, accession: i32, run: i32, name: &str) {
        let sample = Sample {
            sample_accession: accession,
            run_accession: run,
            sample_name: name.to_string(),
            barcode_sequence: String::from("GCCT"),
            primer_sequence: String::from("AGGCTT"),
            sample_type: None,
            host_species: None,
            subject_id: None,
        };
        diesel::insert_into(samples::table)
            .values(&sample)
            .execute(conn)
            .unwrap();
    }

    fn insert_annotation(conn: &SqliteConnection, accession: i32, key: &str, val: &str) {
        diesel::insert_into(annotations::table)
            .values(&Annotation {
                sample_accession: accession,
                key: key.to_string(),
                val: val.to_string(),
            })
            .execute(conn)
            .unwrap();
    }

    #[test]
    fn missing_run_is_none_not_an_error() {
        let conn = test_db();
        assert!(run(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn run_lookup_by_accession() {
        let conn = test_db();
        insert_run(&conn, 1, "Comment");
        let r = run(&conn, 1).unwrap().unwrap();
        assert_eq!(r.comment, "Comment");
    }

    #[test]
    fn run_samples_order_by_name_then_accession() {
        let conn = test_db();
        insert_run(&conn, 1, "Comment");
        insert_sample(&conn, 10, 1, "S2");
        insert_sample(&conn, 11, 1, "S1");
        insert_sample(&conn, 12, 1, "S1");
        let names: Vec<(String, i32)> = run_samples(&conn, 1)
            .unwrap()
            .into_iter()
            .map(|s| (s.sample_name, s.sample_accession))
            .collect();
        assert_eq!(
            names,
            vec![
                (String::from("S1"), 11),
                (String::from("S1"), 12),
                (String::from("S2"), 10)
            ]
        );
    }

    #[test]
    fn run_listing_carries_sample_counts() {
        let conn = test_db();
        insert_run(&conn, 1, "first");
        insert_run(&conn, 2, "second");
        insert_sample(&conn, 10, 1, "S1");
        insert_sample(&conn, 11, 1, "S2");
        let listed = runs(&conn).unwrap();
        assert_eq!(listed.len(), 2);
        let first = listed.iter().find(|r| r.run_accession == 1).unwrap();
        let second = listed.iter().find(|r| r.run_accession == 2).unwrap();
        assert_eq!(first.sample_count, 2);
        assert_eq!(second.sample_count, 0);
    }

    #[test]
    fn empty_accession_set_short_circuits() {
        let conn = test_db();
        assert!(annotations_for_samples(&conn, &[]).unwrap().is_empty());
        assert!(samples_list(&conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn chunk_partitioning_covers_all_accessions() {
        let accessions: Vec<i32> = (1..=1200).collect();
        let sizes: Vec<usize> = accessions
            .chunks(ANNOTATION_CHUNK_SIZE)
            .map(|c| c.len())
            .collect();
        assert_eq!(sizes, vec![500, 500, 200]);

        let one: Vec<i32> = vec![7];
        assert_eq!(one.chunks(ANNOTATION_CHUNK_SIZE).count(), 1);

        // boundary around a whole chunk
        let n499: Vec<i32> = (1..=499).collect();
        let n500: Vec<i32> = (1..=500).collect();
        let n501: Vec<i32> = (1..=501).collect();
        assert_eq!(n499.chunks(ANNOTATION_CHUNK_SIZE).count(), 1);
        assert_eq!(n500.chunks(ANNOTATION_CHUNK_SIZE).count(), 1);
        assert_eq!(n501.chunks(ANNOTATION_CHUNK_SIZE).count(), 2);
    }

    #[test]
    fn annotations_load_across_chunk_boundaries() {
        let conn = test_db();
        insert_run(&conn, 1, "big run");
        // 1200 accessions: three chunks of 500, 500 and 200, each query
        // staying below the 999 bound-parameter ceiling
        let accessions: Vec<i32> = (1..=1200).collect();
        for acc in &accessions {
            insert_sample(&conn, *acc, 1, &format!("S{}", acc));
            insert_annotation(&conn, *acc, "Depth", &format!("{}m", acc));
        }

        let rows = annotations_for_samples(&conn, &accessions).unwrap();
        assert_eq!(rows.len(), 1200);

        // chunks are concatenated in input order
        let first_chunk: Vec<i32> = rows[..500].iter().map(|a| a.sample_accession).collect();
        assert!(first_chunk.iter().all(|acc| *acc <= 500));

        // same multiset regardless of how the input is ordered
        let mut reversed: Vec<i32> = accessions.clone();
        reversed.reverse();
        let mut a: Vec<Annotation> = rows;
        let mut b = annotations_for_samples(&conn, &reversed).unwrap();
        a.sort_by_key(|x| x.sample_accession);
        b.sort_by_key(|x| x.sample_accession);
        assert_eq!(a, b);
    }

    #[test]
    fn tag_listing_and_per_run_stats() {
        let conn = test_db();
        insert_run(&conn, 1, "Comment");
        insert_sample(&conn, 10, 1, "S1");
        insert_sample(&conn, 11, 1, "S2");
        insert_annotation(&conn, 10, "Depth", "10m");
        insert_annotation(&conn, 11, "Depth", "10m");
        insert_annotation(&conn, 11, "pH", "7.2");

        let mut listed = tags(&conn).unwrap();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key, "Depth");
        assert_eq!(listed[0].key_counts, 2);
        assert_eq!(listed[1].key, "pH");
        assert_eq!(listed[1].key_counts, 1);

        let depth = tag_stats(&conn, "Depth").unwrap();
        assert_eq!(depth.len(), 1);
        assert_eq!(depth[0].val, "10m");
        assert_eq!(depth[0].sample_count, 2);
        assert_eq!(depth[0].run_accession, 1);
        assert_eq!(depth[0].run_comment, "Comment");
    }

    #[test]
    fn tag_value_lists_annotated_samples() {
        let conn = test_db();
        insert_run(&conn, 1, "Comment");
        insert_sample(&conn, 10, 1, "S1");
        insert_sample(&conn, 11, 1, "S2");
        insert_annotation(&conn, 10, "Depth", "10m");
        insert_annotation(&conn, 11, "Depth", "20m");

        let hits = tag_value(&conn, "Depth", "10m").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sample_accession, 10);

        let details = samples_list(&conn, &[10]).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].sample_name, "S1");
        assert_eq!(details[0].comment, "Comment");
    }

    #[test]
    fn standard_tags_resolve_to_sample_columns() {
        assert_eq!(standard_tag_column("SampleType"), Some("sample_type"));
        assert_eq!(standard_tag_column("HostSpecies"), Some("host_species"));
        assert_eq!(standard_tag_column("SubjectID"), Some("subject_id"));
        assert_eq!(standard_tag_column("Depth"), None);
    }

    #[test]
    fn standard_tag_queries_use_the_dedicated_columns() {
        let conn = test_db();
        insert_run(&conn, 1, "Comment");
        insert_sample(&conn, 10, 1, "S1");
        insert_sample(&conn, 11, 1, "S2");
        diesel::update(samples::table.filter(samples::sample_accession.eq(10)))
            .set(samples::sample_type.eq("Feces"))
            .execute(&conn)
            .unwrap();

        let stats = standard_tag_stats(&conn, "SampleType", "sample_type").unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].key, "SampleType");
        assert_eq!(stats[0].val, "Feces");
        assert_eq!(stats[0].sample_count, 1);

        let hits = standard_tag_value(&conn, "sample_type", "Feces").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sample_accession, 10);
    }

    #[test]
    fn completeness_stats_from_fixture() {
        let conn = test_db();
        insert_run(&conn, 1, "Comment");
        insert_sample(&conn, 10, 1, "S1");
        insert_sample(&conn, 11, 1, "S2");
        insert_sample(&conn, 12, 1, "S3");
        diesel::update(samples::table.filter(samples::sample_accession.eq(10)))
            .set((
                samples::sample_type.eq("Feces"),
                samples::host_species.eq("Human"),
                samples::subject_id.eq("Hu23"),
            ))
            .execute(&conn)
            .unwrap();
        diesel::update(samples::table.filter(samples::sample_accession.eq(11)))
            .set(samples::sample_type.eq("Slurry"))
            .execute(&conn)
            .unwrap();
        diesel::insert_into(standard_sample_types::table)
            .values((
                standard_sample_types::sample_type.eq("Feces"),
                standard_sample_types::host_associated.eq(true),
            ))
            .execute(&conn)
            .unwrap();
        diesel::insert_into(standard_host_species::table)
            .values((
                standard_host_species::host_species.eq("Human"),
                standard_host_species::ncbi_taxon_id.eq(9606),
            ))
            .execute(&conn)
            .unwrap();
        insert_annotation(&conn, 10, "ReversePrimerSequence", "AACC");

        let s = stats(&conn).unwrap();
        assert_eq!(s.num_samples, 3);
        assert_eq!(s.num_sampletype, 2);
        assert_eq!(s.num_standard_sampletype, 1);
        assert_eq!(s.num_subjectid, 1);
        assert_eq!(s.num_subjectid_with_hostspecies, 1);
        assert_eq!(s.num_hostspecies, 1);
        assert_eq!(s.num_standard_hostspecies, 1);
        assert_eq!(s.num_primer, 3);
        assert_eq!(s.num_reverse_primer, 1);

        assert_eq!(s.standard_sampletype_counts.len(), 1);
        assert_eq!(s.standard_sampletype_counts[0].val.as_deref(), Some("Feces"));
        assert_eq!(s.standard_sampletype_counts[0].num_samples, 1);
        // "Slurry" is nonstandard, and the untyped sample shows up as a NULL group
        assert_eq!(s.nonstandard_sampletype_counts.len(), 2);
        // nonstandard host species excludes NULLs
        assert!(s.nonstandard_hostspecies_counts.is_empty());
    }
}
