//! The Dublin Core metadata row appended once per analysed map.
//!
//! The column set is fixed; most columns are left blank for a cataloguer to
//! fill in. This stage populates title, coverage, spatial coverage, centre
//! coordinates, bounding box, external reference, description and file name.

use crate::job::ObjectEvent;
use crate::pipeline::extraction::ModelExtraction;
use crate::pipeline::features::MapExtent;
use serde::{Deserialize, Serialize};

macro_rules! metadata_schema {
    ($($field:ident: $ty:ty => $column:literal),* $(,)?) => {
        /// One row of the cumulative metadata table.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct MetadataRow {
            $(
                #[serde(rename = $column)]
                pub $field: $ty,
            )*
        }

        /// Header of the cumulative table, in column order.
        pub const COLUMNS: &[&str] = &[$($column),*];
    };
}

metadata_schema! {
    title: String => "Title*",
    alternate_title: String => "Alternate Title",
    creator: String => "Creator*",
    contributor: String => "Contributor",
    artist: String => "Artist",
    author: String => "Author",
    composer: String => "Composer",
    editor: String => "Editor",
    lyricist: String => "Lyricist",
    producer: String => "Producer",
    publisher: String => "Publisher",
    coverage: String => "Coverage",
    spatial_coverage: String => "Spatial Coverage",
    temporal_coverage: String => "Temporal Coverage",
    latitude: Option<f64> => "Latitude",
    longitude: Option<f64> => "Longitude",
    bounding_box: String => "Bounding Box",
    external_reference: String => "External Reference",
    advisor: String => "Advisor",
    committee_member: String => "Committee Member",
    degree_name: String => "Degree Name",
    degree_level: String => "Degree Level",
    department: String => "Department",
    university: String => "University",
    date: String => "Date*",
    date_created: String => "Date Created",
    date_issued: String => "Date Issued",
    date_recorded: String => "Date Recorded",
    date_submitted: String => "Date Submitted",
    date_search: String => "Date Search*",
    description: String => "Description",
    abstract_text: String => "Abstract",
    award: String => "Award",
    frequency: String => "Frequency",
    sponsorship: String => "Sponsorship",
    table_of_contents: String => "Table of Contents",
    subject: String => "Subject",
    lcsh_subject: String => "LCSH Subject*",
    language: String => "Language",
    language_iso: String => "Language-ISO",
    format: String => "Format",
    medium: String => "Medium*",
    extent: String => "Extent",
    item_type: String => "Type*",
    source: String => "Source",
    digital_collection: String => "Digital Collection*",
    physical_collection: String => "Physical Collection*",
    series_location: String => "Series/Location*",
    subcollection: String => "Subcollection",
    repository: String => "Repository*",
    rights: String => "Rights*",
    rights_note: String => "Rights Note",
    rights_license: String => "Rights License",
    rights_uri: String => "Rights URI",
    rights_dpla: String => "Rights DPLA*",
    identifier: String => "Identifier",
    citation: String => "Citation",
    doi: String => "DOI",
    isbn: String => "ISBN",
    uri: String => "URI",
    related_resource: String => "Related Resource*",
    relation_has_format_of: String => "Relation-Has Format Of",
    relation_has_part: String => "Relation-Has Part",
    relation_has_version: String => "Relation-Has Version",
    relation_is_format_of: String => "Relation-Is Format Of",
    relation_is_referenced_by: String => "Relation-Is Referenced By",
    relation_is_replaced_by: String => "Relation-Is Replaced By",
    relation_is_version_of: String => "Relation-Is Version Of",
    relation_references: String => "Relation-References",
    relation_replaces: String => "Relation-Replaces",
    transcript: String => "Transcript",
    path: String => "Path",
    file_name: String => "File Name",
}

impl MetadataRow {
    /// Build the row for `image_name`.
    ///
    /// `labels` are the `"name (type)"` strings of every water resource,
    /// resolved or not. `external_reference` is filled in once the
    /// feature collection has been published.
    pub fn build(
        image_name: &str,
        extraction: &ModelExtraction,
        labels: &[String],
        extent: &MapExtent,
        external_reference: &str,
    ) -> Self {
        let center = extent.center();
        Self {
            title: ObjectEvent::strip_extension(image_name).to_string(),
            coverage: extraction.map_description.clone(),
            spatial_coverage: spatial_coverage(&extraction.county, labels),
            latitude: center.map(|c| c.latitude),
            longitude: center.map(|c| c.longitude),
            bounding_box: extent.bbox.map(|b| b.envelope()).unwrap_or_default(),
            external_reference: external_reference.to_string(),
            description: description(labels),
            file_name: image_name.to_string(),
            ..Default::default()
        }
    }
}

/// County followed by the feature labels, `"; "`-separated.
pub fn spatial_coverage(county: &str, labels: &[String]) -> String {
    let county = county.trim();
    match (county.is_empty(), labels.is_empty()) {
        (false, false) => format!("{}; {}", county, labels.join("; ")),
        (false, true) => county.to_string(),
        (true, false) => labels.join("; "),
        (true, true) => String::new(),
    }
}

/// `"This item includes: a, b."`, or empty when there are no features.
pub fn description(labels: &[String]) -> String {
    if labels.is_empty() {
        String::new()
    } else {
        format!("This item includes: {}.", labels.join(", "))
    }
}
