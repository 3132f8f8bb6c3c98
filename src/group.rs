// src/group.rs

use crate::sheet::{Dataset, Row};

/// All rows sharing one key-column value.
#[derive(Debug, Clone, PartialEq)]
pub struct CityGroup {
    pub city: String,
    pub rows: Vec<Row>,
}

/// Partition `dataset` by the column at `key_index`.
///
/// Rows are stable-sorted by the trimmed display text of the key cell, then
/// split into contiguous runs. Groups come out in ascending key order and
/// rows keep their original relative order within a group. Blank keys form
/// the `""` group.
pub fn group_rows(dataset: &Dataset, key_index: usize) -> Vec<CityGroup> {
    let mut keyed: Vec<(String, &Row)> = dataset
        .rows
        .iter()
        .map(|row| (row.cell(key_index).to_string().trim().to_string(), row))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    let mut groups: Vec<CityGroup> = Vec::new();
    for (key, row) in keyed {
        match groups.last_mut() {
            Some(group) if group.city == key => group.rows.push(row.clone()),
            _ => groups.push(CityGroup {
                city: key,
                rows: vec![row.clone()],
            }),
        }
    }
    groups
}
