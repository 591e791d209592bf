table! {
    runs (run_accession) {
        run_accession -> Integer,
        run_date -> Date,
        lane -> Integer,
        machine_type -> Varchar,
        machine_kit -> Varchar,
        comment -> Text,
        data_uri -> Text,
    }
}

table! {
    samples (sample_accession) {
        sample_accession -> Integer,
        run_accession -> Integer,
        sample_name -> Varchar,
        barcode_sequence -> Varchar,
        primer_sequence -> Varchar,
        sample_type -> Nullable<Varchar>,
        host_species -> Nullable<Varchar>,
        subject_id -> Nullable<Varchar>,
    }
}

table! {
    annotations (sample_accession, key) {
        sample_accession -> Integer,
        key -> Varchar,
        val -> Text,
    }
}

table! {
    standard_sample_types (sample_type) {
        sample_type -> Varchar,
        host_associated -> Bool,
    }
}

table! {
    standard_host_species (host_species) {
        host_species -> Varchar,
        ncbi_taxon_id -> Integer,
    }
}

// Read-only reporting views, declared like tables so the query DSL
// can filter them.
table! {
    runs_samplecounts (run_accession) {
        run_accession -> Integer,
        run_date -> Date,
        lane -> Integer,
        machine_type -> Varchar,
        machine_kit -> Varchar,
        comment -> Text,
        data_uri -> Text,
        sample_count -> BigInt,
    }
}

table! {
    runs_samples (sample_accession) {
        sample_accession -> Integer,
        run_accession -> Integer,
        sample_name -> Varchar,
        barcode_sequence -> Varchar,
        primer_sequence -> Varchar,
        sample_type -> Nullable<Varchar>,
        host_species -> Nullable<Varchar>,
        subject_id -> Nullable<Varchar>,
        run_date -> Date,
        lane -> Integer,
        machine_type -> Varchar,
        machine_kit -> Varchar,
        comment -> Text,
        data_uri -> Text,
    }
}

table! {
    annotation_keys (key) {
        key -> Varchar,
        key_counts -> BigInt,
    }
}

table! {
    annotation_vals_by_run (key, val, run_accession) {
        key -> Varchar,
        val -> Text,
        sample_count -> BigInt,
        run_accession -> Integer,
        run_date -> Date,
        run_comment -> Text,
    }
}

joinable!(samples -> runs (run_accession));
joinable!(annotations -> samples (sample_accession));

allow_tables_to_appear_in_same_query!(
    runs,
    samples,
    annotations,
    standard_sample_types,
    standard_host_species,
);
