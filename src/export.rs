//! Render run metadata as QIIME mapping files, tab-delimited tables, or
//! per-sample JSON.
//!
//! Both delimited formats share the same row layout: a fixed block of
//! standard columns, the pivoted annotation columns in discovery order, and
//! a trailing formatted accession. The QIIME flavor adds a comment block
//! describing the run and renames `ReversePrimerSequence` for QIIME
//! compatibility.

use std::io::{self, Write};

use crate::models::{format_accession, Annotation, Run, Sample, SampleDetail};
use crate::pivot::{pivot, PivotRows, MISSING};

/// Explicit default substitution for optional sample fields. Only an absent
/// value renders as the missing token; empty strings pass through as-is.
pub fn or_na(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or(MISSING)
}

/// Write a QIIME-style mapping file for a run's samples
pub fn write_qiime(
    w: &mut impl Write,
    run: &Run,
    samples: &[Sample],
    mut annotations: Vec<Annotation>,
) -> io::Result<()> {
    // QIIME expects the reverse primer under its own column name
    for a in &mut annotations {
        if a.key == "ReversePrimerSequence" {
            a.key = String::from("ReversePrimer");
        }
    }

    let accessions: Vec<i32> = samples.iter().map(|s| s.sample_accession).collect();
    let (columns, table) = pivot(&annotations, &accessions, MISSING);

    write!(
        w,
        "#SampleID\tBarcodeSequence\tLinkerPrimerSequence\tSampleType\tHostSpecies\tSubjectID\t"
    )?;
    if !columns.is_empty() {
        write!(w, "{}\t", columns.join("\t"))?;
    }
    writeln!(w, "Description")?;

    let comment: String = run.comment.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    writeln!(w, "#{}", comment)?;
    writeln!(w, "#Sequencing date: {}", run.run_date)?;
    writeln!(w, "#File name: {}", run.data_file())?;
    writeln!(w, "#Lane: {}", run.lane)?;
    writeln!(w, "#Platform: {} {}", run.machine_type, run.machine_kit)?;
    writeln!(w, "#Run accession: {}", run.formatted_accession())?;

    write_rows(w, samples, &columns, &table)
}

/// Write a generic tab-delimited table for a run's samples
pub fn write_delim(
    w: &mut impl Write,
    samples: &[Sample],
    annotations: &[Annotation],
) -> io::Result<()> {
    let accessions: Vec<i32> = samples.iter().map(|s| s.sample_accession).collect();
    let (columns, table) = pivot(annotations, &accessions, MISSING);

    write!(w, "SampleID\tBarcode\tPrimer\tSampleType\tHostSpecies\tSubjectID\t")?;
    if !columns.is_empty() {
        write!(w, "{}\t", columns.join("\t"))?;
    }
    writeln!(w, "sample_accession")?;

    write_rows(w, samples, &columns, &table)
}

fn write_rows(
    w: &mut impl Write,
    samples: &[Sample],
    columns: &[String],
    table: &PivotRows,
) -> io::Result<()> {
    for sample in samples {
        let mut vals: Vec<String> = vec![
            sample.sample_name.clone(),
            sample.barcode_sequence.to_uppercase(),
            sample.primer_sequence.to_uppercase(),
            or_na(&sample.sample_type).to_string(),
            or_na(&sample.host_species).to_string(),
            or_na(&sample.subject_id).to_string(),
        ];
        if let Some(row) = table.get(&sample.sample_accession) {
            for column in columns {
                vals.push(row.get(column).cloned().unwrap_or_else(|| MISSING.to_string()));
            }
        }
        vals.push(format_accession(sample.sample_accession));
        writeln!(w, "{}", vals.join("\t"))?;
    }
    Ok(())
}

/// Merge a sample record and its annotations into one JSON object
pub fn sample_json(
    sample: &SampleDetail,
    annotations: &[Annotation],
) -> serde_json::Result<serde_json::Value> {
    let mut value = serde_json::to_value(sample)?;
    if let Some(obj) = value.as_object_mut() {
        for a in annotations {
            obj.insert(a.key.clone(), serde_json::Value::String(a.val.clone()));
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_run() -> Run {
        Run {
            run_accession: 1,
            run_date: NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
            lane: 1,
            machine_type: String::from("GS-Junior"),
            machine_kit: String::from("Titanium"),
            comment: String::from("Bat guano study"),
            data_uri: String::from("runs/run1.sff"),
        }
    }

    fn test_samples() -> Vec<Sample> {
        vec![
            Sample {
                sample_accession: 21,
                run_accession: 1,
                sample_name: String::from("S1"),
                barcode_sequence: String::from("gcct"),
                primer_sequence: String::from("AGGCTT"),
                sample_type: Some(String::from("Feces")),
                host_species: Some(String::from("Human")),
                subject_id: Some(String::from("Hu23")),
            },
            Sample {
                sample_accession: 22,
                run_accession: 1,
                sample_name: String::from("S2"),
                barcode_sequence: String::from("GCAT"),
                primer_sequence: String::from("AGGCTT"),
                sample_type: None,
                host_species: None,
                subject_id: None,
            },
        ]
    }

    fn test_annotations() -> Vec<Annotation> {
        vec![
            Annotation {
                sample_accession: 21,
                key: String::from("Depth"),
                val: String::from("10m"),
            },
            Annotation {
                sample_accession: 22,
                key: String::from("Depth"),
                val: String::from("20m"),
            },
            Annotation {
                sample_accession: 21,
                key: String::from("ReversePrimerSequence"),
                val: String::from("AACC"),
            },
        ]
    }

    const QIIME_TEXT: &str = "\
#SampleID\tBarcodeSequence\tLinkerPrimerSequence\tSampleType\tHostSpecies\tSubjectID\tDepth\tReversePrimer\tDescription
#Bat guano study
#Sequencing date: 2012-01-01
#File name: run1.sff
#Lane: 1
#Platform: GS-Junior Titanium
#Run accession: PCMP000001
S1\tGCCT\tAGGCTT\tFeces\tHuman\tHu23\t10m\tAACC\tPCMP000021
S2\tGCAT\tAGGCTT\tNA\tNA\tNA\t20m\tNA\tPCMP000022
";

    const DELIM_TEXT: &str = "\
SampleID\tBarcode\tPrimer\tSampleType\tHostSpecies\tSubjectID\tDepth\tReversePrimerSequence\tsample_accession
S1\tGCCT\tAGGCTT\tFeces\tHuman\tHu23\t10m\tAACC\tPCMP000021
S2\tGCAT\tAGGCTT\tNA\tNA\tNA\t20m\tNA\tPCMP000022
";

    #[test]
    fn qiime_mapping_file_matches_expected_text() {
        let mut out = Vec::new();
        write_qiime(&mut out, &test_run(), &test_samples(), test_annotations()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), QIIME_TEXT);
    }

    #[test]
    fn delim_table_matches_expected_text() {
        let mut out = Vec::new();
        write_delim(&mut out, &test_samples(), &test_annotations()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), DELIM_TEXT);
    }

    #[test]
    fn qiime_comment_block_strips_newlines() {
        let mut run = test_run();
        run.comment = String::from("line one\r\nline two");
        let mut out = Vec::new();
        write_qiime(&mut out, &run, &test_samples(), Vec::new()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("#line oneline two\n"));
    }

    #[test]
    fn export_without_annotations_has_no_dynamic_columns() {
        let mut out = Vec::new();
        write_delim(&mut out, &test_samples(), &[]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(
            header,
            "SampleID\tBarcode\tPrimer\tSampleType\tHostSpecies\tSubjectID\tsample_accession"
        );
    }

    #[test]
    fn only_absent_fields_default_to_na() {
        assert_eq!(or_na(&None), "NA");
        assert_eq!(or_na(&Some(String::new())), "");
        assert_eq!(or_na(&Some(String::from("Feces"))), "Feces");
    }

    #[test]
    fn sample_json_merges_annotations() {
        let sample = SampleDetail {
            sample_accession: 21,
            run_accession: 1,
            sample_name: String::from("S1"),
            barcode_sequence: String::from("GCCT"),
            primer_sequence: String::from("AGGCTT"),
            sample_type: Some(String::from("Feces")),
            host_species: None,
            subject_id: None,
            run_date: NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
            lane: 1,
            machine_type: String::from("GS-Junior"),
            machine_kit: String::from("Titanium"),
            comment: String::from("Bat guano study"),
            data_uri: String::from("runs/run1.sff"),
        };
        let annotations = vec![Annotation {
            sample_accession: 21,
            key: String::from("Depth"),
            val: String::from("10m"),
        }];

        let value = sample_json(&sample, &annotations).unwrap();
        assert_eq!(value["sample_name"], "S1");
        assert_eq!(value["Depth"], "10m");
        assert_eq!(value["sample_type"], "Feces");
        assert_eq!(value["run_date"], "2012-01-01");
    }
}
