//! Area demands: room items, clusters of items, and the room-kind table.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key carrying a cluster's stated total in demand tables.
pub const TOTAL_KEY: &str = "total";

#[derive(Error, Debug, PartialEq)]
pub enum DemandError {
    #[error("unknown room name `{0}`")]
    UnknownRoom(String),
    #[error("room `{name}` has invalid area {area}")]
    InvalidArea { name: String, area: f64 },
    #[error("option {index} out of range ({count} options)")]
    NoSuchOption { index: usize, count: usize },
    #[error("cluster {0} has no rooms")]
    EmptyCluster(usize),
}

/// Canonical room programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Office,
    MeetingRoom,
    ToolRoom,
    Storage,
    CommunityCorridor,
    Toilet,
    Stair,
    MechRoom,
    ExhibitExperience,
    Experience2,
    DiscussRoom,
    Program1,
    Program2,
    ExhibitPlanningRoom,
    UnmanCafe,
    Kitchen,
    KitchenStorage,
    Reception,
    Dorm1,
    Dorm2,
    NightWorkRoom,
    ShowerAndChange,
}

/// (source table label, canonical tag, kind, needs a minimum inner width)
static ROOM_TABLE: &[(&str, &str, RoomKind, bool)] = &[
    ("사무실", "office", RoomKind::Office, true),
    ("회의실", "meeting_room", RoomKind::MeetingRoom, true),
    ("장비실", "tool_room", RoomKind::ToolRoom, false),
    ("창고(수장)", "storage", RoomKind::Storage, false),
    ("커뮤니티홀, 복도", "community_corridor", RoomKind::CommunityCorridor, true),
    ("화장실", "toilet", RoomKind::Toilet, false),
    ("계단실", "stair", RoomKind::Stair, false),
    ("기계전기실", "mech_room", RoomKind::MechRoom, false),
    ("전시/체험실", "exhibit_experience", RoomKind::ExhibitExperience, true),
    ("체험실2", "experience2", RoomKind::Experience2, true),
    ("토론방", "discuss_room", RoomKind::DiscussRoom, true),
    ("프로그램실1", "program1", RoomKind::Program1, true),
    ("프로그램실2", "program2", RoomKind::Program2, true),
    ("전시준비실", "exhibit_planning_room", RoomKind::ExhibitPlanningRoom, true),
    ("무인카페", "unman_cafe", RoomKind::UnmanCafe, true),
    ("주방", "kitchen", RoomKind::Kitchen, true),
    ("주방창고", "kitchen_storage", RoomKind::KitchenStorage, false),
    ("안내휴게실", "reception", RoomKind::Reception, false),
    ("숙사1", "dorm1", RoomKind::Dorm1, false),
    ("숙사2", "dorm2", RoomKind::Dorm2, false),
    ("당직실", "night_work_room", RoomKind::NightWorkRoom, false),
    ("탈의실/샤워실", "shower_and_change", RoomKind::ShowerAndChange, false),
];

impl RoomKind {
    /// Resolves either a source table label or a canonical tag.
    pub fn from_name(name: &str) -> Result<RoomKind, DemandError> {
        let name = name.trim();
        ROOM_TABLE
            .iter()
            .find(|(label, tag, _, _)| *label == name || *tag == name)
            .map(|(_, _, kind, _)| *kind)
            .ok_or_else(|| DemandError::UnknownRoom(name.to_string()))
    }

    pub fn tag(&self) -> &'static str {
        self.entry().1
    }

    /// Rooms people work in need a usable inner width.
    pub fn needs_min_width(&self) -> bool {
        self.entry().3
    }

    /// Table rows follow the variant order.
    fn entry(&self) -> &'static (&'static str, &'static str, RoomKind, bool) {
        &ROOM_TABLE[*self as usize]
    }
}

impl Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One room demand: a target area under a name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandItem {
    pub area: f64,
    pub name: String,
    pub kind: Option<RoomKind>,
}

impl DemandItem {
    pub fn new(area: f64, name: impl Into<String>) -> DemandItem {
        DemandItem { area, name: name.into(), kind: None }
    }

    pub fn with_kind(area: f64, kind: RoomKind) -> DemandItem {
        DemandItem { area, name: kind.tag().to_string(), kind: Some(kind) }
    }
}

impl Display for DemandItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.area, self.name)
    }
}

/// Sum of item areas.
pub fn total_area(items: &[DemandItem]) -> f64 {
    items.iter().map(|i| i.area).sum()
}

/// A bundle of room demands placed together as one program unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AreaCluster {
    pub name: String,
    pub items: Vec<DemandItem>,
    /// Ordering key; the item sum unless the source table stated otherwise
    pub total: f64,
}

impl AreaCluster {
    pub fn new(name: impl Into<String>, items: Vec<DemandItem>) -> AreaCluster {
        let total = total_area(&items);
        AreaCluster { name: name.into(), items, total }
    }

    /// Overrides the derived total with a stated one.
    pub fn with_total(mut self, total: f64) -> AreaCluster {
        self.total = total;
        self
    }

    pub fn item_total(&self) -> f64 {
        total_area(&self.items)
    }

    /// Items not named in `placed`, in cluster order.
    pub fn unplaced(&self, placed: &[DemandItem]) -> Vec<DemandItem> {
        self.items
            .iter()
            .filter(|i| !placed.iter().any(|p| p.name == i.name))
            .cloned()
            .collect()
    }
}

/// Builds one cluster from a `{name: area}` table row, consuming the `total` entry.
pub fn parse_cluster(
    index: usize,
    mut row: BTreeMap<String, f64>,
) -> Result<AreaCluster, DemandError> {
    let stated_total = row.remove(TOTAL_KEY);
    if row.is_empty() {
        return Err(DemandError::EmptyCluster(index));
    }
    let mut items = Vec::with_capacity(row.len());
    for (name, area) in row {
        let kind = RoomKind::from_name(&name)?;
        if !(area.is_finite() && area >= 0.) {
            return Err(DemandError::InvalidArea { name, area });
        }
        items.push(DemandItem::with_kind(area, kind));
    }
    let cluster = AreaCluster::new(format!("cluster{}", index), items);
    Ok(match stated_total {
        Some(total) => cluster.with_total(total),
        None => cluster,
    })
}

/// Demand options: each option is a full list of clusters for one mass.
pub type DemandOptions = Vec<Vec<AreaCluster>>;

pub fn parse_options(json: &str) -> anyhow::Result<DemandOptions> {
    let raw: Vec<Vec<BTreeMap<String, f64>>> =
        serde_json::from_str(json).context("malformed demand table")?;
    let mut options = Vec::with_capacity(raw.len());
    for (o, rows) in raw.into_iter().enumerate() {
        let clusters = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| parse_cluster(i, row))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("demand option {}", o))?;
        options.push(clusters);
    }
    Ok(options)
}

pub fn load_options(path: &Path) -> anyhow::Result<DemandOptions> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading demand table {}", path.display()))?;
    parse_options(&json)
}

/// Picks one option out of a loaded table.
pub fn select_option(options: DemandOptions, index: usize) -> Result<Vec<AreaCluster>, DemandError> {
    let count = options.len();
    options
        .into_iter()
        .nth(index)
        .ok_or(DemandError::NoSuchOption { index, count })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_labels_and_tags() {
        assert_eq!(RoomKind::from_name("회의실").unwrap(), RoomKind::MeetingRoom);
        assert_eq!(RoomKind::from_name("meeting_room").unwrap(), RoomKind::MeetingRoom);
        assert_eq!(RoomKind::Kitchen.tag(), "kitchen");
        assert!(RoomKind::Office.needs_min_width());
        assert!(!RoomKind::Toilet.needs_min_width());
    }

    #[test]
    fn table_rows_line_up_with_kinds() {
        for (i, (_, tag, kind, _)) in ROOM_TABLE.iter().enumerate() {
            assert_eq!(*kind as usize, i);
            assert_eq!(kind.tag(), *tag);
        }
    }

    #[test]
    fn unknown_names_rejected_at_parse_time() {
        let mut row = BTreeMap::new();
        row.insert("ballroom".to_string(), 40.);
        assert_eq!(
            parse_cluster(0, row).unwrap_err(),
            DemandError::UnknownRoom("ballroom".to_string())
        );
    }

    #[test]
    fn total_entry_is_consumed() {
        let json = r#"[[{"office": 60, "toilet": 15, "total": 80}, {"kitchen": 30}]]"#;
        let options = parse_options(json).unwrap();
        let clusters = select_option(options, 0).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].items.len(), 2);
        assert_eq!(clusters[0].total, 80.);
        assert_eq!(clusters[0].item_total(), 75.);
        assert_eq!(clusters[1].total, 30.);
    }

    #[test]
    fn missing_option_is_an_error() {
        assert_eq!(
            select_option(vec![], 2).unwrap_err(),
            DemandError::NoSuchOption { index: 2, count: 0 }
        );
    }

    #[test]
    fn unplaced_filters_by_name() {
        let cluster = AreaCluster::new(
            "c",
            vec![DemandItem::new(60., "a"), DemandItem::new(40., "b"), DemandItem::new(10., "c")],
        );
        let left = cluster.unplaced(&[DemandItem::new(60., "a")]);
        assert_eq!(left.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
    }
}
