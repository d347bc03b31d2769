//! Zone Inference Engine
//!
//! Maps the occupancy vector onto named zones at two levels:
//!
//! - **Rooms**: a room is active when any of its sensors is occupied.
//! - **Grid**: one tracked room is split into a 3×3 grid watched by four
//!   corner sensors. Corner cells attribute to a single sensor, edge cells to
//!   a pair of neighbouring corners, and the center to either diagonal pair.
//!
//! ```text
//!   NW ─── N ─── NE
//!   │             │
//!   W     center  E
//!   │             │
//!   SW ─── S ─── SE
//! ```
//!
//! Both levels are recomputed from scratch on every call. There is no
//! hysteresis, and overlapping grid cells are expected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::types::OccupancyVector;

/// One cell of the tracked room's 3×3 grid, in reading order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum GridZone {
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
}

impl GridZone {
    pub fn all() -> &'static [GridZone] {
        &[
            GridZone::NorthWest,
            GridZone::North,
            GridZone::NorthEast,
            GridZone::West,
            GridZone::Center,
            GridZone::East,
            GridZone::SouthWest,
            GridZone::South,
            GridZone::SouthEast,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GridZone::NorthWest => "north-west",
            GridZone::North => "north",
            GridZone::NorthEast => "north-east",
            GridZone::West => "west",
            GridZone::Center => "center",
            GridZone::East => "east",
            GridZone::SouthWest => "south-west",
            GridZone::South => "south",
            GridZone::SouthEast => "south-east",
        }
    }

    /// Closed rule table over the four corner readings
    ///
    /// A corner cell is lit when its own sensor fires and the diagonally
    /// opposite one does not; an edge cell when both corners along that edge
    /// fire; the center when either diagonal pair fires together.
    pub fn infer(corners: CornerReadings) -> BTreeSet<GridZone> {
        let CornerReadings {
            north_east: ne,
            north_west: nw,
            south_east: se,
            south_west: sw,
        } = corners;

        let rules = [
            (GridZone::NorthEast, ne && !sw),
            (GridZone::NorthWest, nw && !se),
            (GridZone::SouthEast, se && !nw),
            (GridZone::SouthWest, sw && !ne),
            (GridZone::North, nw && ne),
            (GridZone::South, sw && se),
            (GridZone::East, ne && se),
            (GridZone::West, nw && sw),
            (GridZone::Center, (ne && sw) || (nw && se)),
        ];

        rules
            .into_iter()
            .filter(|(_, active)| *active)
            .map(|(zone, _)| zone)
            .collect()
    }
}

impl std::fmt::Display for GridZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States of the four corner sensors of the tracked room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CornerReadings {
    pub north_east: bool,
    pub north_west: bool,
    pub south_east: bool,
    pub south_west: bool,
}

/// Which sensor sits in which corner of the tracked room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridLayout {
    /// Room the grid subdivides
    pub room: String,
    pub north_east: String,
    pub north_west: String,
    pub south_east: String,
    pub south_west: String,
}

impl GridLayout {
    pub fn sensors(&self) -> [&str; 4] {
        [
            &self.north_east,
            &self.north_west,
            &self.south_east,
            &self.south_west,
        ]
    }

    pub fn readings(&self, occupancy: &OccupancyVector) -> CornerReadings {
        CornerReadings {
            north_east: occupancy.is_occupied(&self.north_east),
            north_west: occupancy.is_occupied(&self.north_west),
            south_east: occupancy.is_occupied(&self.south_east),
            south_west: occupancy.is_occupied(&self.south_west),
        }
    }
}

/// A room and the occupancy sensors that cover it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomDefinition {
    pub name: String,
    pub sensors: Vec<String>,
    /// Environment sensor reporting this room's air quality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_sensor: Option<String>,
}

/// Result of one inference pass
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ZoneActivation {
    pub rooms: BTreeSet<String>,
    pub grid: BTreeSet<GridZone>,
}

impl ZoneActivation {
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty() && self.grid.is_empty()
    }
}

/// Static sensor-to-zone mapping, evaluated as a pure function
#[derive(Debug, Clone, Default)]
pub struct ZoneEngine {
    rooms: Vec<RoomDefinition>,
    grid: Option<GridLayout>,
}

impl ZoneEngine {
    pub fn new(rooms: Vec<RoomDefinition>, grid: Option<GridLayout>) -> Self {
        Self { rooms, grid }
    }

    pub fn rooms(&self) -> &[RoomDefinition] {
        &self.rooms
    }

    pub fn grid(&self) -> Option<&GridLayout> {
        self.grid.as_ref()
    }

    /// Whether the sensor feeds any room or grid cell
    pub fn tracks(&self, sensor_id: &str) -> bool {
        self.rooms
            .iter()
            .any(|room| room.sensors.iter().any(|s| s == sensor_id))
            || self
                .grid
                .as_ref()
                .is_some_and(|g| g.sensors().iter().any(|s| *s == sensor_id))
    }

    /// Recompute every zone from the current occupancy vector
    pub fn infer(&self, occupancy: &OccupancyVector) -> ZoneActivation {
        let rooms = self
            .rooms
            .iter()
            .filter(|room| room.sensors.iter().any(|s| occupancy.is_occupied(s)))
            .map(|room| room.name.clone())
            .collect();

        let grid = self
            .grid
            .as_ref()
            .map(|layout| GridZone::infer(layout.readings(occupancy)))
            .unwrap_or_default();

        ZoneActivation { rooms, grid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GridZone::*;

    fn corners(ne: bool, nw: bool, se: bool, sw: bool) -> CornerReadings {
        CornerReadings {
            north_east: ne,
            north_west: nw,
            south_east: se,
            south_west: sw,
        }
    }

    fn zones(list: &[GridZone]) -> BTreeSet<GridZone> {
        list.iter().copied().collect()
    }

    fn living_grid() -> GridLayout {
        GridLayout {
            room: "living".to_string(),
            north_east: "PIR1".to_string(),
            north_west: "PIR2".to_string(),
            south_east: "PIR3".to_string(),
            south_west: "PIR4".to_string(),
        }
    }

    #[test]
    fn test_grid_all_false_is_empty() {
        assert!(GridZone::infer(corners(false, false, false, false)).is_empty());
    }

    #[test]
    fn test_grid_single_corner() {
        assert_eq!(GridZone::infer(corners(true, false, false, false)), zones(&[NorthEast]));
        assert_eq!(GridZone::infer(corners(false, true, false, false)), zones(&[NorthWest]));
        assert_eq!(GridZone::infer(corners(false, false, true, false)), zones(&[SouthEast]));
        assert_eq!(GridZone::infer(corners(false, false, false, true)), zones(&[SouthWest]));
    }

    #[test]
    fn test_grid_edge_pair() {
        assert_eq!(
            GridZone::infer(corners(true, true, false, false)),
            zones(&[NorthEast, NorthWest, North])
        );
        assert_eq!(
            GridZone::infer(corners(false, false, true, true)),
            zones(&[SouthEast, SouthWest, South])
        );
        assert_eq!(
            GridZone::infer(corners(true, false, true, false)),
            zones(&[NorthEast, SouthEast, East])
        );
        assert_eq!(
            GridZone::infer(corners(false, true, false, true)),
            zones(&[NorthWest, SouthWest, West])
        );
    }

    #[test]
    fn test_grid_diagonal_pair() {
        assert_eq!(GridZone::infer(corners(true, false, false, true)), zones(&[Center]));
        assert_eq!(GridZone::infer(corners(false, true, true, false)), zones(&[Center]));
    }

    #[test]
    fn test_grid_all_true() {
        assert_eq!(
            GridZone::infer(corners(true, true, true, true)),
            zones(&[North, South, East, West, Center])
        );
    }

    #[test]
    fn test_grid_full_table() {
        // (ne, nw, se, sw) -> lit cells
        let table: [((bool, bool, bool, bool), &[GridZone]); 16] = [
            ((false, false, false, false), &[]),
            ((true, false, false, false), &[NorthEast]),
            ((false, true, false, false), &[NorthWest]),
            ((false, false, true, false), &[SouthEast]),
            ((false, false, false, true), &[SouthWest]),
            ((true, true, false, false), &[NorthEast, NorthWest, North]),
            ((true, false, true, false), &[NorthEast, SouthEast, East]),
            ((true, false, false, true), &[Center]),
            ((false, true, true, false), &[Center]),
            ((false, true, false, true), &[NorthWest, SouthWest, West]),
            ((false, false, true, true), &[SouthEast, SouthWest, South]),
            ((true, true, true, false), &[NorthEast, North, East, Center]),
            ((true, true, false, true), &[NorthWest, North, West, Center]),
            ((true, false, true, true), &[SouthEast, South, East, Center]),
            ((false, true, true, true), &[SouthWest, South, West, Center]),
            ((true, true, true, true), &[North, South, East, West, Center]),
        ];

        for ((ne, nw, se, sw), expected) in table {
            let input = corners(ne, nw, se, sw);
            assert_eq!(GridZone::infer(input), zones(expected), "input {:?}", input);
            assert_eq!(GridZone::infer(input), GridZone::infer(input));
        }
    }

    #[test]
    fn test_grid_zone_serde_names() {
        for zone in GridZone::all() {
            let json = serde_json::to_string(zone).unwrap();
            assert_eq!(json, format!("\"{}\"", zone));
        }
    }

    #[test]
    fn test_room_is_any_sensor() {
        let engine = ZoneEngine::new(
            vec![
                RoomDefinition {
                    name: "living".to_string(),
                    sensors: vec!["PIR1".to_string(), "PIR2".to_string()],
                    env_sensor: Some("M5Stack2".to_string()),
                },
                RoomDefinition {
                    name: "kitchen".to_string(),
                    sensors: vec!["PIR18".to_string()],
                    env_sensor: None,
                },
            ],
            None,
        );

        let occupancy = OccupancyVector::new().with("PIR1", false).with("PIR2", true);
        let activation = engine.infer(&occupancy);

        assert_eq!(activation.rooms, BTreeSet::from(["living".to_string()]));
        assert!(activation.grid.is_empty());
    }

    #[test]
    fn test_unreported_sensors_are_unoccupied() {
        let engine = ZoneEngine::new(vec![], Some(living_grid()));
        assert!(engine.infer(&OccupancyVector::new()).is_empty());
    }

    #[test]
    fn test_engine_combines_levels() {
        let engine = ZoneEngine::new(
            vec![RoomDefinition {
                name: "living".to_string(),
                sensors: vec!["PIR1".into(), "PIR2".into(), "PIR3".into(), "PIR4".into()],
                env_sensor: None,
            }],
            Some(living_grid()),
        );

        let occupancy = OccupancyVector::new().with("PIR1", true).with("PIR4", true);
        let activation = engine.infer(&occupancy);

        assert!(activation.rooms.contains("living"));
        assert_eq!(activation.grid, zones(&[Center]));
    }

    #[test]
    fn test_flicker_flips_immediately() {
        let engine = ZoneEngine::new(vec![], Some(living_grid()));
        let mut occupancy = OccupancyVector::new().with("PIR1", true);

        assert_eq!(engine.infer(&occupancy).grid, zones(&[NorthEast]));
        occupancy.set("PIR1", false);
        assert!(engine.infer(&occupancy).grid.is_empty());
    }

    #[test]
    fn test_tracks() {
        let engine = ZoneEngine::new(
            vec![RoomDefinition {
                name: "kitchen".to_string(),
                sensors: vec!["PIR18".to_string()],
                env_sensor: None,
            }],
            Some(living_grid()),
        );

        assert!(engine.tracks("PIR18"));
        assert!(engine.tracks("PIR3"));
        assert!(!engine.tracks("PIR99"));
    }
}
