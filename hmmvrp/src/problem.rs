use crate::error::{Error, Result};
use crate::solution::Solution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub type NodeId = usize;
pub type VehicleId = usize;
pub type Cost = i64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Position {
        Position { x, y }
    }

    fn real_distance(&self, other: &Self) -> f64 {
        let xdist = self.x - other.x;
        let ydist = self.y - other.y;
        f64::sqrt(xdist * xdist + ydist * ydist)
    }

    /// Distance under `weight_type`; `Explicit` has no geometric distance and yields 0
    pub fn distance(&self, other: &Self, weight_type: EdgeWeightType) -> Cost {
        match weight_type {
            EdgeWeightType::Euc2d => (self.real_distance(other) + 0.5).floor() as Cost,
            EdgeWeightType::Ceil2d => self.real_distance(other).ceil() as Cost,
            EdgeWeightType::Explicit => 0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeWeightType {
    #[default]
    #[serde(rename = "EUC_2D")]
    Euc2d,
    #[serde(rename = "CEIL_2D")]
    Ceil2d,
    #[serde(rename = "EXPLICIT")]
    Explicit,
}

impl FromStr for EdgeWeightType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "EUC_2D" => Ok(EdgeWeightType::Euc2d),
            "CEIL_2D" => Ok(EdgeWeightType::Ceil2d),
            "EXPLICIT" => Ok(EdgeWeightType::Explicit),
            _ => Err(format!("unknown edge weight type {s}, expected EUC_2D|CEIL_2D|EXPLICIT")),
        }
    }
}

impl fmt::Display for EdgeWeightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeWeightType::Euc2d => "EUC_2D",
            EdgeWeightType::Ceil2d => "CEIL_2D",
            EdgeWeightType::Explicit => "EXPLICIT",
        };
        f.write_str(name)
    }
}

/// A validated hmm-VRP instance: symmetric integer distances and one speed factor per vehicle.
/// Node 0 is the depot.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub num_nodes: usize,
    pub num_customers: usize,
    pub num_vehicles: usize,
    distances: Vec<Vec<Cost>>,
    speeds: Vec<Cost>,
}

impl Instance {
    pub fn new(name: impl Into<String>, distances: Vec<Vec<Cost>>, speeds: Vec<Cost>) -> Result<Instance> {
        let num_nodes = distances.len();
        let num_vehicles = speeds.len();

        if num_nodes < 2 {
            return Err(Error::InvalidInstance(format!(
                "at least a depot and one customer are required, got {num_nodes} nodes"
            )));
        }
        if num_vehicles == 0 {
            return Err(Error::InvalidInstance("no vehicles".to_string()));
        }
        if num_nodes - 1 < num_vehicles {
            return Err(Error::InvalidInstance(format!(
                "{num_vehicles} vehicles need at least as many customers, got {}",
                num_nodes - 1
            )));
        }
        for (i, row) in distances.iter().enumerate() {
            if row.len() != num_nodes {
                return Err(Error::InvalidInstance(format!(
                    "row {i} of the distance matrix has {} entries, expected {num_nodes}",
                    row.len()
                )));
            }
            if row[i] != 0 {
                return Err(Error::InvalidInstance(format!("distance from {i} to itself is {}", row[i])));
            }
        }
        for i in 0..num_nodes {
            for j in i + 1..num_nodes {
                if distances[i][j] < 0 {
                    return Err(Error::InvalidInstance(format!("negative distance between {i} and {j}")));
                }
                if distances[i][j] != distances[j][i] {
                    return Err(Error::InvalidInstance(format!(
                        "distance matrix is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }
        if let Some(v) = speeds.iter().position(|&s| s < 1) {
            return Err(Error::InvalidInstance(format!(
                "vehicle {v} has speed factor {}, expected at least 1",
                speeds[v]
            )));
        }

        Ok(Instance {
            name: name.into(),
            num_nodes,
            num_customers: num_nodes - 1,
            num_vehicles,
            distances,
            speeds,
        })
    }

    pub fn from_coordinates(
        name: impl Into<String>,
        coordinates: &[Position],
        weight_type: EdgeWeightType,
        speeds: Vec<Cost>,
    ) -> Result<Instance> {
        let distances = coordinates
            .iter()
            .map(|a| coordinates.iter().map(|b| a.distance(b, weight_type)).collect())
            .collect();
        Instance::new(name, distances, speeds)
    }

    pub fn distance(&self, i: NodeId, j: NodeId) -> Cost {
        self.distances[i][j]
    }

    pub fn distances(&self) -> &[Vec<Cost>] {
        &self.distances
    }

    pub fn speed(&self, vehicle: VehicleId) -> Cost {
        self.speeds[vehicle]
    }

    pub fn speeds(&self) -> &[Cost] {
        &self.speeds
    }

    /// Travel time of `vehicle` between `i` and `j`
    pub fn weighted_distance(&self, vehicle: VehicleId, i: NodeId, j: NodeId) -> Cost {
        self.distances[i][j] * self.speeds[vehicle]
    }

    /// Weighted length of the closed route `route` driven by `vehicle`
    pub fn route_cost(&self, vehicle: VehicleId, route: &[NodeId]) -> Cost {
        if route.len() < 2 {
            return 0;
        }
        route
            .iter()
            .zip(route.iter().cycle().skip(1))
            .map(|(&i, &j)| self.weighted_distance(vehicle, i, j))
            .sum()
    }

    pub fn max_distance(&self) -> Cost {
        self.distances.iter().flatten().copied().max().unwrap_or(0)
    }

    pub fn max_speed(&self) -> Cost {
        self.speeds.iter().copied().max().unwrap_or(1)
    }

    pub fn all_vehicles(&self) -> impl Iterator<Item = VehicleId> {
        0..self.num_vehicles
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> {
        0..self.num_nodes
    }

    pub fn all_nodes_except(&self, exception: NodeId) -> impl Iterator<Item = NodeId> {
        self.all_nodes().filter(move |i| *i != exception)
    }

    pub fn all_nodes_after(&self, after: NodeId) -> impl Iterator<Item = NodeId> {
        after + 1..self.num_nodes
    }

    pub fn all_customers(&self) -> impl Iterator<Item = NodeId> {
        1..self.num_nodes
    }

    /// Vehicles sharing the speed factor of `vehicle`, including itself
    pub fn same_speed_vehicles(&self, vehicle: VehicleId) -> impl Iterator<Item = VehicleId> + '_ {
        let speed = self.speeds[vehicle];
        self.all_vehicles().filter(move |&v| self.speeds[v] == speed)
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Instance {} with {} customers and {} vehicles, speeds {:?}",
            self.name, self.num_customers, self.num_vehicles, self.speeds
        )
    }
}

/// On-disk form of an instance, optionally carrying a solution record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceFile {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub node_count: usize,
    #[serde(default)]
    pub display_data_type: String,
    #[serde(default)]
    pub edge_weight_type: EdgeWeightType,
    #[serde(default)]
    pub node_coordinates: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_weights: Option<Vec<Vec<Cost>>>,
    #[serde(default)]
    pub depots: Vec<NodeId>,
    pub vehicle_count: usize,
    pub travel_speeds: Vec<Cost>,
    #[serde(rename = "Solution", default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
}

impl InstanceFile {
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<InstanceFile> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn to_instance(&self) -> Result<Instance> {
        if !self.depots.is_empty() && self.depots != [0] {
            return Err(Error::InvalidInstance(format!(
                "only a single depot at node 0 is supported, got {:?}",
                self.depots
            )));
        }
        if self.vehicle_count != self.travel_speeds.len() {
            return Err(Error::InvalidInstance(format!(
                "vehicle_count is {} but {} travel speeds are given",
                self.vehicle_count,
                self.travel_speeds.len()
            )));
        }

        let distances: Vec<Vec<Cost>> = match self.edge_weight_type {
            EdgeWeightType::Explicit => self.edge_weights.clone().ok_or_else(|| {
                Error::InvalidInstance("EXPLICIT edge weights requested but none given".to_string())
            })?,
            weight_type => {
                let mut coordinates = Vec::with_capacity(self.node_coordinates.len());
                for (i, c) in self.node_coordinates.iter().enumerate() {
                    match c.as_slice() {
                        [x, y, ..] => coordinates.push(Position::new(*x, *y)),
                        _ => {
                            return Err(Error::InvalidInstance(format!(
                                "node {i} has {} coordinates, expected 2",
                                c.len()
                            )))
                        }
                    }
                }
                coordinates
                    .iter()
                    .map(|a| coordinates.iter().map(|b| a.distance(b, weight_type)).collect())
                    .collect()
            }
        };

        if distances.len() != self.node_count {
            return Err(Error::InvalidInstance(format!(
                "node_count is {} but {} nodes are given",
                self.node_count,
                distances.len()
            )));
        }

        Instance::new(self.name.clone(), distances, self.travel_speeds.clone())
    }

    /// Draws a random instance with integer coordinates in `[0, x_max) x [0, y_max)`
    pub fn generate<R: Rng>(config: &GeneratorConfig, index: usize, rng: &mut R) -> InstanceFile {
        let node_coordinates = (0..config.nodes)
            .map(|_| {
                vec![
                    rng.gen_range(0..config.x_max.max(1)) as f64,
                    rng.gen_range(0..config.y_max.max(1)) as f64,
                ]
            })
            .collect();
        let travel_speeds = config.speeds.draw(config, rng);

        InstanceFile {
            name: format!(
                "{}_{}_{}_{}_{}",
                config.name, config.nodes, config.vehicles, config.speeds, index
            ),
            comment: format!(
                "{} instance Nr. {} with {} nodes, {} vehicles and speeds generated as {}",
                config.name, index, config.nodes, config.vehicles, config.speeds
            ),
            kind: "hmmVRP".to_string(),
            node_count: config.nodes,
            display_data_type: "COORD_DISPLAY".to_string(),
            edge_weight_type: config.weight_type,
            node_coordinates,
            edge_weights: None,
            depots: vec![0],
            vehicle_count: config.vehicles,
            travel_speeds,
            solution: None,
        }
    }
}

/// How speed factors are drawn for generated instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedStrategy {
    /// Every vehicle has speed factor 1
    #[serde(rename = "ONE")]
    One,
    /// Independent speeds in `rng_start..rng_start + rng_end`
    #[serde(rename = "RNG")]
    Random,
    /// Groups of consecutive vehicles share one random speed
    #[serde(rename = "RNG-GROUP")]
    RandomGroup,
}

impl SpeedStrategy {
    fn draw<R: Rng>(self, config: &GeneratorConfig, rng: &mut R) -> Vec<Cost> {
        let mut draw = || config.rng_start + rng.gen_range(0..config.rng_end.max(1));
        match self {
            SpeedStrategy::One => vec![1; config.vehicles],
            SpeedStrategy::Random => (0..config.vehicles).map(|_| draw()).collect(),
            SpeedStrategy::RandomGroup => {
                let group = (config.vehicles / config.group_size.max(1)).max(1);
                let mut speed = 0;
                (0..config.vehicles)
                    .map(|v| {
                        if v % group == 0 {
                            speed = draw();
                        }
                        speed
                    })
                    .collect()
            }
        }
    }
}

impl FromStr for SpeedStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ONE" => Ok(SpeedStrategy::One),
            "RNG" => Ok(SpeedStrategy::Random),
            "RNG-GROUP" => Ok(SpeedStrategy::RandomGroup),
            _ => Err(format!("unknown speed strategy {s}, expected ONE|RNG|RNG-GROUP")),
        }
    }
}

impl fmt::Display for SpeedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpeedStrategy::One => "ONE",
            SpeedStrategy::Random => "RNG",
            SpeedStrategy::RandomGroup => "RNG-GROUP",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub name: String,
    pub nodes: usize,
    pub vehicles: usize,
    pub speeds: SpeedStrategy,
    pub x_max: u32,
    pub y_max: u32,
    pub rng_start: Cost,
    pub rng_end: Cost,
    pub group_size: usize,
    pub weight_type: EdgeWeightType,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            name: "hmmvrp".to_string(),
            nodes: 10,
            vehicles: 2,
            speeds: SpeedStrategy::One,
            x_max: 10000,
            y_max: 10000,
            rng_start: 1,
            rng_end: 10,
            group_size: 3,
            weight_type: EdgeWeightType::Euc2d,
        }
    }
}

/// Depot and three customers on a line at 0, 10, 20 and 30, served by two unit-speed vehicles
#[cfg(test)]
pub(crate) fn line_instance() -> Instance {
    let coordinates: Vec<Position> = [0.0, 10.0, 20.0, 30.0]
        .iter()
        .map(|&x| Position::new(x, 0.0))
        .collect();
    Instance::from_coordinates("line", &coordinates, EdgeWeightType::Euc2d, vec![1, 1]).unwrap()
}

/// Depot at 0 and node i at x = 10 * (7i mod `nodes`), so index order zigzags along the line.
/// `nodes` must be a prime other than 7.
#[cfg(test)]
pub(crate) fn scattered_line(nodes: usize, speeds: Vec<Cost>) -> Instance {
    let coordinates: Vec<Position> = (0..nodes)
        .map(|i| Position::new((10 * ((7 * i) % nodes)) as f64, 0.0))
        .collect();
    Instance::from_coordinates("scattered", &coordinates, EdgeWeightType::Euc2d, speeds).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro128StarStar;

    mod position {
        use super::*;

        #[test]
        fn computes_horizontal_distance() {
            let pos1 = Position::new(12.5, 23.0);
            let pos2 = Position::new(22.5, 23.0);
            assert_eq!(pos1.distance(&pos2, EdgeWeightType::Euc2d), 10);
            assert_eq!(pos2.distance(&pos1, EdgeWeightType::Euc2d), 10);
        }

        #[test]
        fn rounds_to_nearest_for_euclidean() {
            let pos1 = Position::new(12.5, 23.0);
            let pos2 = Position::new(13.5, 24.0);
            assert_eq!(pos1.distance(&pos2, EdgeWeightType::Euc2d), 1);
            let pos3 = Position::new(14.0, 24.5);
            assert_eq!(pos1.distance(&pos3, EdgeWeightType::Euc2d), 2);
        }

        #[test]
        fn rounds_up_for_ceiling() {
            let pos1 = Position::new(0.0, 0.0);
            let pos2 = Position::new(1.0, 1.0);
            assert_eq!(pos1.distance(&pos2, EdgeWeightType::Ceil2d), 2);
            assert_eq!(pos1.distance(&pos1, EdgeWeightType::Ceil2d), 0);
        }
    }

    mod instance {
        use super::*;

        #[test]
        fn builds_line_instance() {
            let instance = line_instance();
            assert_eq!(instance.num_nodes, 4);
            assert_eq!(instance.num_customers, 3);
            assert_eq!(instance.distance(0, 3), 30);
            assert_eq!(instance.route_cost(0, &[0, 1, 2, 0]), 40);
            assert_eq!(instance.max_distance(), 30);
        }

        #[test]
        fn rejects_asymmetric_distances() {
            let result = Instance::new("bad", vec![vec![0, 1, 2], vec![1, 0, 3], vec![2, 4, 0]], vec![1]);
            assert!(matches!(result, Err(Error::InvalidInstance(_))));
        }

        #[test]
        fn rejects_too_many_vehicles() {
            let result = Instance::new("bad", vec![vec![0, 1], vec![1, 0]], vec![1, 1]);
            assert!(matches!(result, Err(Error::InvalidInstance(_))));
        }

        #[test]
        fn rejects_zero_speed() {
            let result = Instance::new("bad", vec![vec![0, 1], vec![1, 0]], vec![0]);
            assert!(matches!(result, Err(Error::InvalidInstance(_))));
        }

        #[test]
        fn groups_vehicles_by_speed() {
            let instance = Instance::new(
                "speeds",
                vec![vec![0, 1, 1, 1], vec![1, 0, 1, 1], vec![1, 1, 0, 1], vec![1, 1, 1, 0]],
                vec![2, 1, 2],
            )
            .unwrap();
            assert_eq!(instance.same_speed_vehicles(0).collect::<Vec<_>>(), vec![0, 2]);
            assert_eq!(instance.same_speed_vehicles(1).collect::<Vec<_>>(), vec![1]);
        }
    }

    mod file {
        use super::*;

        #[test]
        fn parses_json_instance() {
            let json = r#"{
                "name": "tiny",
                "comment": "",
                "type": "hmmVRP",
                "node_count": 3,
                "display_data_type": "COORD_DISPLAY",
                "edge_weight_type": "EUC_2D",
                "node_coordinates": [[0, 0], [3, 4], [6, 8]],
                "edge_weights": null,
                "depots": [0],
                "vehicle_count": 1,
                "travel_speeds": [2]
            }"#;
            let file: InstanceFile = serde_json::from_str(json).unwrap();
            let instance = file.to_instance().unwrap();
            assert_eq!(instance.distance(0, 2), 10);
            assert_eq!(instance.weighted_distance(0, 0, 1), 10);
        }

        #[test]
        fn accepts_explicit_weights() {
            let file = InstanceFile {
                name: "explicit".to_string(),
                node_count: 2,
                edge_weight_type: EdgeWeightType::Explicit,
                edge_weights: Some(vec![vec![0, 5], vec![5, 0]]),
                vehicle_count: 1,
                travel_speeds: vec![1],
                ..Default::default()
            };
            assert_eq!(file.to_instance().unwrap().distance(1, 0), 5);
        }

        #[test]
        fn rejects_multiple_depots() {
            let file = InstanceFile {
                name: "depots".to_string(),
                node_count: 2,
                edge_weight_type: EdgeWeightType::Explicit,
                edge_weights: Some(vec![vec![0, 5], vec![5, 0]]),
                depots: vec![0, 1],
                vehicle_count: 1,
                travel_speeds: vec![1],
                ..Default::default()
            };
            assert!(matches!(file.to_instance(), Err(Error::InvalidInstance(_))));
        }
    }

    mod generator {
        use super::*;

        #[test]
        fn generates_valid_instances() {
            let config = GeneratorConfig {
                nodes: 12,
                vehicles: 3,
                speeds: SpeedStrategy::Random,
                ..Default::default()
            };
            let mut rng = Xoshiro128StarStar::seed_from_u64(7);
            let file = InstanceFile::generate(&config, 0, &mut rng);
            assert_eq!(file.name, "hmmvrp_12_3_RNG_0");
            assert!(file.travel_speeds.iter().all(|&s| (1..11).contains(&s)));
            let instance = file.to_instance().unwrap();
            assert_eq!(instance.num_nodes, 12);
        }

        #[test]
        fn groups_share_speeds() {
            let config = GeneratorConfig {
                vehicles: 6,
                speeds: SpeedStrategy::RandomGroup,
                group_size: 3,
                ..Default::default()
            };
            let mut rng = Xoshiro128StarStar::seed_from_u64(3);
            let speeds = SpeedStrategy::RandomGroup.draw(&config, &mut rng);
            // six vehicles in groups of three draw every second vehicle
            assert_eq!(speeds[0], speeds[1]);
            assert_eq!(speeds[2], speeds[3]);
            assert_eq!(speeds[4], speeds[5]);
        }

        #[test]
        fn same_seed_same_instance() {
            let config = GeneratorConfig::default();
            let a = InstanceFile::generate(&config, 1, &mut Xoshiro128StarStar::seed_from_u64(11));
            let b = InstanceFile::generate(&config, 1, &mut Xoshiro128StarStar::seed_from_u64(11));
            assert_eq!(a.node_coordinates, b.node_coordinates);
            assert_eq!(a.travel_speeds, b.travel_speeds);
        }
    }
}
