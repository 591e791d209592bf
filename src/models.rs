use crate::schema::*;

use chrono::NaiveDate;
use diesel::sql_types::{BigInt, Nullable, Text};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Prefix for human-displayed run and sample accessions
pub const ACCESSION_PREFIX: &str = "PCMP";

/// Render an accession number with the registry prefix and zero-padded width
pub fn format_accession(accession: i32) -> String {
    format!("{}{:06}", ACCESSION_PREFIX, accession)
}

/// Render a date for HTML pages (exports keep the ISO form)
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%m/%d/%Y").to_string()
}

#[derive(Queryable,QueryableByName,Insertable,Debug,Serialize,Clone)]
#[table_name="runs"]
pub struct Run {
    pub run_accession: i32,
    pub run_date: NaiveDate,
    pub lane: i32,
    pub machine_type: String,
    pub machine_kit: String,
    pub comment: String,
    pub data_uri: String,
}

impl Run {
    pub fn formatted_accession(&self) -> String {
        format_accession(self.run_accession)
    }

    /// Platform label for run listings. The machine type carries kit revisions
    /// for Illumina instruments, which all display as plain "Illumina".
    pub fn platform(&self) -> String {
        lazy_static! {
            static ref ILLUMINA: Regex = Regex::new("^Illumina").unwrap();
        }
        if ILLUMINA.is_match(&self.machine_type) {
            format!("Illumina {}", self.machine_kit)
        } else {
            format!("{} {}", self.machine_type, self.machine_kit)
        }
    }

    /// Base name of the run's source data file
    pub fn data_file(&self) -> &str {
        self.data_uri.rsplit('/').next().unwrap_or(&self.data_uri)
    }
}

#[derive(Queryable,QueryableByName,Insertable,Debug,Serialize,Clone)]
#[table_name="samples"]
pub struct Sample {
    pub sample_accession: i32,
    pub run_accession: i32,
    pub sample_name: String,
    pub barcode_sequence: String,
    pub primer_sequence: String,
    pub sample_type: Option<String>,
    pub host_species: Option<String>,
    pub subject_id: Option<String>,
}

impl Sample {
    pub fn formatted_accession(&self) -> String {
        format_accession(self.sample_accession)
    }
}

/// A free-form key/value tag attached to a sample, stored in long format
#[derive(Queryable,QueryableByName,Insertable,Debug,Serialize,Clone,PartialEq,Eq)]
#[table_name="annotations"]
pub struct Annotation {
    pub sample_accession: i32,
    pub key: String,
    pub val: String,
}

/// A run joined with its per-run sample count (view `runs_samplecounts`)
#[derive(Queryable,QueryableByName,Debug,Serialize,Clone)]
#[table_name="runs_samplecounts"]
pub struct RunSampleCount {
    pub run_accession: i32,
    pub run_date: NaiveDate,
    pub lane: i32,
    pub machine_type: String,
    pub machine_kit: String,
    pub comment: String,
    pub data_uri: String,
    pub sample_count: i64,
}

impl RunSampleCount {
    pub fn run(&self) -> Run {
        Run {
            run_accession: self.run_accession,
            run_date: self.run_date,
            lane: self.lane,
            machine_type: self.machine_type.clone(),
            machine_kit: self.machine_kit.clone(),
            comment: self.comment.clone(),
            data_uri: self.data_uri.clone(),
        }
    }
}

/// A sample joined with its run (view `runs_samples`)
#[derive(Queryable,QueryableByName,Debug,Serialize,Clone)]
#[table_name="runs_samples"]
pub struct SampleDetail {
    pub sample_accession: i32,
    pub run_accession: i32,
    pub sample_name: String,
    pub barcode_sequence: String,
    pub primer_sequence: String,
    pub sample_type: Option<String>,
    pub host_species: Option<String>,
    pub subject_id: Option<String>,
    pub run_date: NaiveDate,
    pub lane: i32,
    pub machine_type: String,
    pub machine_kit: String,
    pub comment: String,
    pub data_uri: String,
}

impl SampleDetail {
    pub fn formatted_accession(&self) -> String {
        format_accession(self.sample_accession)
    }
}

impl From<SampleDetail> for Sample {
    fn from(detail: SampleDetail) -> Self {
        Sample {
            sample_accession: detail.sample_accession,
            run_accession: detail.run_accession,
            sample_name: detail.sample_name,
            barcode_sequence: detail.barcode_sequence,
            primer_sequence: detail.primer_sequence,
            sample_type: detail.sample_type,
            host_species: detail.host_species,
            subject_id: detail.subject_id,
        }
    }
}

/// An annotation key with its usage count (view `annotation_keys`)
#[derive(Queryable,QueryableByName,Debug,Serialize,Clone)]
#[table_name="annotation_keys"]
pub struct TagCount {
    pub key: String,
    pub key_counts: i64,
}

/// Per-run statistics for one annotation value (view `annotation_vals_by_run`)
#[derive(Queryable,QueryableByName,Debug,Serialize,Clone)]
#[table_name="annotation_vals_by_run"]
pub struct TagRunStat {
    pub key: String,
    pub val: String,
    pub sample_count: i64,
    pub run_accession: i32,
    pub run_date: NaiveDate,
    pub run_comment: String,
}

/// One value/count pair from the standardization breakdowns
#[derive(QueryableByName,Debug,Serialize,Clone)]
pub struct TagValueCount {
    #[sql_type = "Nullable<Text>"]
    pub val: Option<String>,
    #[sql_type = "BigInt"]
    pub num_samples: i64,
}

#[derive(QueryableByName,Debug)]
pub struct CountRow {
    #[sql_type = "BigInt"]
    pub n: i64,
}

/// Metadata completeness numbers for the stats dashboard
#[derive(Debug,Serialize)]
pub struct RegistryStats {
    pub num_samples: i64,
    pub num_sampletype: i64,
    pub num_standard_sampletype: i64,
    pub standard_sampletype_counts: Vec<TagValueCount>,
    pub nonstandard_sampletype_counts: Vec<TagValueCount>,
    pub num_subjectid: i64,
    pub num_subjectid_with_hostspecies: i64,
    pub num_hostspecies: i64,
    pub num_standard_hostspecies: i64,
    pub standard_hostspecies_counts: Vec<TagValueCount>,
    pub nonstandard_hostspecies_counts: Vec<TagValueCount>,
    pub num_primer: i64,
    pub num_reverse_primer: i64,
}
