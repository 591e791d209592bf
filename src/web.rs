//! Rocket frontend: browse pages, export endpoints and the stats dashboard.

use rocket::fs::relative;
use rocket::fs::FileServer;
use rocket::http::ContentType;
use rocket::http::Status;
use rocket::request::FromParam;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket_dyn_templates::handlebars::no_escape;
use rocket_dyn_templates::handlebars::Handlebars;
use rocket_dyn_templates::Template;
use serde::Serialize;

use crate::config::ExportFormat;
use crate::export;
use crate::models::*;
use crate::pivot;
use crate::registry;
use crate::registry::RegistryDb;

macro_rules! context {
    ($($key:ident $(: $value:expr)?),*$(,)?) => {{
        use serde::ser::{Serialize, Serializer, SerializeMap};
        use ::std::fmt::{Debug, Formatter};

        #[allow(non_camel_case_types)]
        struct ContextMacroCtxObject<$($key: Serialize),*> {
            $($key: $key),*
        }

        #[allow(non_camel_case_types)]
        impl<$($key: Serialize),*> Serialize for ContextMacroCtxObject<$($key),*> {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where S: Serializer,
            {
                let mut map = serializer.serialize_map(None)?;
                $(map.serialize_entry(stringify!($key), &self.$key)?;)*
                map.end()
            }
        }

        #[allow(non_camel_case_types)]
        impl<$($key: Debug + Serialize),*> Debug for ContextMacroCtxObject<$($key),*> {
            fn fmt(&self, f: &mut Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct("context!")
                    $(.field(stringify!($key), &self.$key))*
                    .finish()
            }
        }

        ContextMacroCtxObject {
            $($key $(: $value)?),*
        }
    }};
}

type PageResult = Result<Template, Custom<String>>;

fn store_error(e: diesel::result::Error) -> Custom<String> {
    error!("Database error: {}", e);
    Custom(Status::InternalServerError, String::from("Database error"))
}

fn render_error<E: std::fmt::Display>(e: E) -> Custom<String> {
    error!("Could not render response: {}", e);
    Custom(Status::InternalServerError, String::from("Internal error"))
}

/* View models handed to the templates */

#[derive(Serialize)]
struct AnnotationItem {
    key: String,
    val: String,
}

#[derive(Serialize)]
struct RunRow {
    accession: i32,
    accession_label: String,
    date: String,
    platform: String,
    lane: i32,
    sample_count: i64,
    comment: String,
}

impl RunRow {
    fn new(rc: &RunSampleCount) -> Self {
        let run = rc.run();
        RunRow {
            accession: run.run_accession,
            accession_label: run.formatted_accession(),
            date: format_date(&run.run_date),
            platform: run.platform(),
            lane: run.lane,
            sample_count: rc.sample_count,
            comment: run.comment,
        }
    }
}

#[derive(Serialize)]
struct SampleRow {
    accession: i32,
    accession_label: String,
    name: String,
    barcode: String,
    primer: String,
    sample_type: String,
    host_species: String,
    subject_id: String,
    annotations: Vec<AnnotationItem>,
}

impl SampleRow {
    fn new(sample: &Sample, annotations: Vec<Annotation>) -> Self {
        SampleRow {
            accession: sample.sample_accession,
            accession_label: sample.formatted_accession(),
            name: sample.sample_name.clone(),
            barcode: sample.barcode_sequence.to_uppercase(),
            primer: sample.primer_sequence.to_uppercase(),
            sample_type: export::or_na(&sample.sample_type).to_string(),
            host_species: export::or_na(&sample.host_species).to_string(),
            subject_id: export::or_na(&sample.subject_id).to_string(),
            annotations: annotations
                .into_iter()
                .map(|a| AnnotationItem { key: a.key, val: a.val })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct DetailRow {
    accession: i32,
    accession_label: String,
    name: String,
    barcode: String,
    primer: String,
    run_accession: i32,
    run_label: String,
    run_date: String,
    annotations: Vec<AnnotationItem>,
}

impl DetailRow {
    fn new(sample: &SampleDetail, annotations: Vec<Annotation>) -> Self {
        DetailRow {
            accession: sample.sample_accession,
            accession_label: sample.formatted_accession(),
            name: sample.sample_name.clone(),
            barcode: sample.barcode_sequence.to_uppercase(),
            primer: sample.primer_sequence.to_uppercase(),
            run_accession: sample.run_accession,
            run_label: format_accession(sample.run_accession),
            run_date: format_date(&sample.run_date),
            annotations: annotations
                .into_iter()
                .map(|a| AnnotationItem { key: a.key, val: a.val })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct TagCloudItem {
    key: String,
    size: String,
}

#[derive(Serialize)]
struct TagStatRow {
    val: String,
    sample_count: i64,
    run_accession: i32,
    run_label: String,
    run_date: String,
    run_comment: String,
}

#[derive(Serialize)]
struct ValueCountRow {
    val: String,
    num_samples: i64,
}

fn count_rows(counts: &[TagValueCount]) -> Vec<ValueCountRow> {
    counts
        .iter()
        .map(|c| ValueCountRow {
            val: c.val.clone().unwrap_or_default(),
            num_samples: c.num_samples,
        })
        .collect()
}

/* Path parameters carrying an export extension */

/// Run export target like `42.txt` (QIIME) or `42.tsv` (tab-delimited)
pub struct RunExportParam {
    accession: i32,
    format: ExportFormat,
}

impl<'r> FromParam<'r> for RunExportParam {
    type Error = &'r str;

    fn from_param(param: &'r str) -> Result<Self, Self::Error> {
        let (stem, ext) = param.rsplit_once('.').ok_or(param)?;
        let format = match ext {
            "txt" => ExportFormat::Qiime,
            "tsv" => ExportFormat::Tsv,
            _ => return Err(param),
        };
        let accession = stem.parse().map_err(|_| param)?;
        Ok(RunExportParam { accession, format })
    }
}

/// Sample export target like `42.json`
pub struct SampleJsonParam(i32);

impl<'r> FromParam<'r> for SampleJsonParam {
    type Error = &'r str;

    fn from_param(param: &'r str) -> Result<Self, Self::Error> {
        let stem = param.strip_suffix(".json").ok_or(param)?;
        Ok(SampleJsonParam(stem.parse().map_err(|_| param)?))
    }
}

/* Routes */

async fn require_run(conn: &RegistryDb, accession: i32) -> Result<Run, Custom<String>> {
    match conn
        .run(move |c| registry::run(c, accession))
        .await
        .map_err(store_error)?
    {
        Some(run) => Ok(run),
        None => Err(Custom(
            Status::NotFound,
            format!("Run {} does not exist.", accession),
        )),
    }
}

async fn render_runs(conn: RegistryDb) -> PageResult {
    let runs = conn.run(|c| registry::runs(c)).await.map_err(store_error)?;
    let runs: Vec<RunRow> = runs.iter().map(RunRow::new).collect();
    Ok(Template::render("runs", context! { runs }))
}

#[get("/")]
async fn index(conn: RegistryDb) -> PageResult {
    render_runs(conn).await
}

#[get("/runs")]
async fn browse_runs(conn: RegistryDb) -> PageResult {
    render_runs(conn).await
}

#[get("/runs/<accession>", rank = 2)]
async fn show_run(conn: RegistryDb, accession: i32) -> PageResult {
    let run = require_run(&conn, accession).await?;
    let (samples, annotations) = conn
        .run(
            move |c| -> diesel::QueryResult<(Vec<Sample>, Vec<Annotation>)> {
                let samples = registry::run_samples(c, accession)?;
                let accessions: Vec<i32> = samples.iter().map(|s| s.sample_accession).collect();
                let annotations = registry::annotations_for_samples(c, &accessions)?;
                Ok((samples, annotations))
            },
        )
        .await
        .map_err(store_error)?;

    let mut grouped = pivot::group_by_accession(annotations);
    let samples: Vec<SampleRow> = samples
        .iter()
        .map(|s| SampleRow::new(s, grouped.remove(&s.sample_accession).unwrap_or_default()))
        .collect();

    Ok(Template::render(
        "run",
        context! {
            accession: run.run_accession,
            accession_label: run.formatted_accession(),
            comment: run.comment.clone(),
            date: format_date(&run.run_date),
            lane: run.lane,
            platform: run.platform(),
            data_uri: run.data_uri.clone(),
            data_file: run.data_file().to_string(),
            samples,
        },
    ))
}

#[get("/runs/<target>", rank = 1)]
async fn export_run(
    conn: RegistryDb,
    target: RunExportParam,
) -> Result<(ContentType, String), Custom<String>> {
    let accession = target.accession;
    let run = require_run(&conn, accession).await?;
    let (samples, annotations) = conn
        .run(
            move |c| -> diesel::QueryResult<(Vec<Sample>, Vec<Annotation>)> {
                let samples = registry::run_samples(c, accession)?;
                let accessions: Vec<i32> = samples.iter().map(|s| s.sample_accession).collect();
                let annotations = registry::annotations_for_samples(c, &accessions)?;
                Ok((samples, annotations))
            },
        )
        .await
        .map_err(store_error)?;

    let mut out: Vec<u8> = Vec::new();
    match target.format {
        ExportFormat::Qiime => {
            export::write_qiime(&mut out, &run, &samples, annotations).map_err(render_error)?
        }
        ExportFormat::Tsv => {
            export::write_delim(&mut out, &samples, &annotations).map_err(render_error)?
        }
    }
    let body = String::from_utf8(out).map_err(render_error)?;
    Ok((ContentType::Plain, body))
}

#[get("/samples/<sample>")]
async fn export_sample(
    conn: RegistryDb,
    sample: SampleJsonParam,
) -> Result<Json<serde_json::Value>, Custom<String>> {
    let accession = sample.0;
    let detail = match conn
        .run(move |c| registry::sample(c, accession))
        .await
        .map_err(store_error)?
    {
        Some(detail) => detail,
        None => {
            return Err(Custom(
                Status::NotFound,
                format!("Sample {} does not exist.", accession),
            ))
        }
    };
    let annotations = conn
        .run(move |c| registry::sample_annotations(c, accession))
        .await
        .map_err(store_error)?;

    let value = export::sample_json(&detail, &annotations).map_err(render_error)?;
    Ok(Json(value))
}

#[get("/samples/startingwith/<prefix>")]
async fn match_samples(conn: RegistryDb, prefix: String) -> PageResult {
    let needle = prefix.clone();
    let (samples, annotations) = conn
        .run(
            move |c| -> diesel::QueryResult<(Vec<SampleDetail>, Vec<Annotation>)> {
                let samples = registry::sample_match(c, &needle)?;
                let accessions: Vec<i32> = samples.iter().map(|s| s.sample_accession).collect();
                let annotations = registry::annotations_for_samples(c, &accessions)?;
                Ok((samples, annotations))
            },
        )
        .await
        .map_err(store_error)?;

    let mut grouped = pivot::group_by_accession(annotations);
    let samples: Vec<DetailRow> = samples
        .iter()
        .map(|s| DetailRow::new(s, grouped.remove(&s.sample_accession).unwrap_or_default()))
        .collect();

    Ok(Template::render(
        "samples_list",
        context! { prefix, samples },
    ))
}

#[get("/tags")]
async fn browse_tags(conn: RegistryDb) -> PageResult {
    let tags = conn.run(|c| registry::tags(c)).await.map_err(store_error)?;

    let maxcnt = tags.iter().map(|t| t.key_counts).max().unwrap_or(0);
    let tags: Vec<TagCloudItem> = tags
        .iter()
        .map(|t| TagCloudItem {
            key: t.key.clone(),
            size: if maxcnt > 0 {
                format!("{:.0}", 10.0 + 90.0 * (t.key_counts as f64 / maxcnt as f64))
            } else {
                String::from("10")
            },
        })
        .collect();

    Ok(Template::render("tags", context! { tags }))
}

#[get("/tags/<tag>")]
async fn show_tag(conn: RegistryDb, tag: String) -> PageResult {
    let needle = tag.clone();
    let stats = conn
        .run(move |c| match registry::standard_tag_column(&needle) {
            Some(column) => registry::standard_tag_stats(c, &needle, column),
            None => registry::tag_stats(c, &needle),
        })
        .await
        .map_err(store_error)?;

    let stats: Vec<TagStatRow> = stats
        .iter()
        .map(|s| TagStatRow {
            val: s.val.clone(),
            sample_count: s.sample_count,
            run_accession: s.run_accession,
            run_label: format_accession(s.run_accession),
            run_date: format_date(&s.run_date),
            run_comment: s.run_comment.clone(),
        })
        .collect();

    Ok(Template::render("tag", context! { tag, stats }))
}

#[get("/tags/<tag>/<value>")]
async fn show_tag_value(conn: RegistryDb, tag: String, value: String) -> PageResult {
    let t = tag.clone();
    let v = value.clone();
    let (samples, annotations) = conn
        .run(
            move |c| -> diesel::QueryResult<(Vec<SampleDetail>, Vec<Annotation>)> {
                let samples = match registry::standard_tag_column(&t) {
                    Some(column) => registry::standard_tag_value(c, column, &v)?,
                    None => {
                        let hits = registry::tag_value(c, &t, &v)?;
                        let accessions: Vec<i32> =
                            hits.iter().map(|a| a.sample_accession).collect();
                        registry::samples_list(c, &accessions)?
                    }
                };
                let accessions: Vec<i32> = samples.iter().map(|s| s.sample_accession).collect();
                let annotations = registry::annotations_for_samples(c, &accessions)?;
                Ok((samples, annotations))
            },
        )
        .await
        .map_err(store_error)?;

    let mut grouped = pivot::group_by_accession(annotations);
    let samples: Vec<DetailRow> = samples
        .iter()
        .map(|s| DetailRow::new(s, grouped.remove(&s.sample_accession).unwrap_or_default()))
        .collect();

    Ok(Template::render(
        "tag_value",
        context! { tag, value, samples },
    ))
}

fn pct(numerator: i64, denominator: i64) -> String {
    if denominator == 0 {
        String::from("0.00")
    } else {
        format!("{:.2}", 100.0 * numerator as f64 / denominator as f64)
    }
}

#[get("/stats")]
async fn show_stats(conn: RegistryDb) -> PageResult {
    let stats = conn.run(|c| registry::stats(c)).await.map_err(store_error)?;

    Ok(Template::render(
        "stats",
        context! {
            num_samples: stats.num_samples,
            num_sampletype: stats.num_sampletype,
            sampletype_pct: pct(stats.num_sampletype, stats.num_samples),
            num_standard_sampletype: stats.num_standard_sampletype,
            standard_sampletype_pct: pct(stats.num_standard_sampletype, stats.num_sampletype),
            standard_sampletype_counts: count_rows(&stats.standard_sampletype_counts),
            nonstandard_sampletype_counts: count_rows(&stats.nonstandard_sampletype_counts),
            num_subjectid: stats.num_subjectid,
            num_subjectid_with_hostspecies: stats.num_subjectid_with_hostspecies,
            subjectid_hostspecies_pct: pct(stats.num_subjectid_with_hostspecies, stats.num_subjectid),
            num_hostspecies: stats.num_hostspecies,
            num_standard_hostspecies: stats.num_standard_hostspecies,
            standard_hostspecies_pct: pct(stats.num_standard_hostspecies, stats.num_hostspecies),
            standard_hostspecies_counts: count_rows(&stats.standard_hostspecies_counts),
            nonstandard_hostspecies_counts: count_rows(&stats.nonstandard_hostspecies_counts),
            num_primer: stats.num_primer,
            num_reverse_primer: stats.num_reverse_primer,
            reverse_primer_pct: pct(stats.num_reverse_primer, stats.num_primer),
        },
    ))
}

pub fn customize_hbs(hbs: &mut Handlebars) {
    hbs.register_escape_fn(no_escape);
    hbs.set_strict_mode(true);
}

#[rocket::main]
pub async fn serve(db_url: String) {
    let figment = rocket::Config::figment().merge(("databases.registry.url", db_url));
    if let Err(e) = rocket::custom(figment)
        .attach(RegistryDb::fairing())
        .attach(Template::custom(|engines| {
            customize_hbs(&mut engines.handlebars)
        }))
        .mount("/static", FileServer::from(relative!("static")))
        .mount(
            "/",
            routes![
                index,
                browse_runs,
                export_run,
                show_run,
                export_sample,
                match_samples,
                browse_tags,
                show_tag,
                show_tag_value,
                show_stats
            ],
        )
        .launch()
        .await
    {
        error!("Could not launch rocket: {}", e);
    }
}
