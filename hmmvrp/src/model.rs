use crate::config::{EdgeDomain, SolverConfig};
use crate::cuts::{CutRow, Sense};
use crate::index::{IndexScheme, MasterKind};
use crate::problem::{Cost, Instance, NodeId};
use log::{info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Binary,
    Integer,
}

impl VarKind {
    pub fn is_integral(self) -> bool {
        !matches!(self, VarKind::Continuous)
    }
}

#[derive(Debug, Clone)]
pub struct VarSpec {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
    pub objective: f64,
}

impl VarSpec {
    fn new(name: String, kind: VarKind, lower: f64, upper: f64) -> VarSpec {
        VarSpec {
            name,
            kind,
            lower,
            upper,
            objective: 0.0,
        }
    }
}

/// Master problem of the hmm-VRP: minimize `CMax` over the assignment variables X,
/// the edge variables Y and, with MTZ, the arrival times C.
#[derive(Debug)]
pub struct MasterModel<'a> {
    instance: &'a Instance,
    index: IndexScheme,
    variables: Vec<VarSpec>,
    constraints: Vec<(String, CutRow)>,
    c_start: Option<usize>,
    pseudo_process: Vec<Cost>,
    pseudo_setup: Vec<Vec<Cost>>,
    big_m: Cost,
}

impl<'a> MasterModel<'a> {
    pub fn build(instance: &'a Instance, config: &SolverConfig) -> MasterModel<'a> {
        let n = instance.num_nodes;
        let index = IndexScheme::new(config.master, n, instance.num_vehicles);

        let pseudo_process: Vec<Cost> = instance
            .all_nodes()
            .map(|j| {
                instance
                    .all_nodes_except(j)
                    .map(|k| instance.distance(j, k))
                    .min()
                    .unwrap_or(0)
            })
            .collect();
        let pseudo_setup = instance
            .all_nodes()
            .map(|j| {
                instance
                    .all_nodes()
                    .map(|k| if k == j { 0 } else { instance.distance(j, k) - pseudo_process[j] })
                    .collect()
            })
            .collect();

        let mut model = MasterModel {
            instance,
            index,
            variables: Vec::with_capacity(index.end() + n),
            constraints: Vec::new(),
            c_start: None,
            pseudo_process,
            pseudo_setup,
            big_m: instance.max_distance() * instance.max_speed() * n as Cost + 1,
        };

        model.add_variables(config);
        model.add_makespan_constraints();
        model.add_assignment_constraints();
        model.add_depot_constraints();
        model.add_degree_constraints();
        model.add_global_subtour_constraints();
        if config.uses_mtz() {
            model.add_ordering_constraints();
        } else {
            info!("No subtour inequality classes will be added to the master problem");
        }

        info!(
            "Master model {} with {} variables and {} constraints",
            config.master,
            model.variables.len(),
            model.constraints.len()
        );
        model
    }

    fn add_variables(&mut self, config: &SolverConfig) {
        let index = self.index;
        let mut cmax = VarSpec::new("Cmax".to_string(), VarKind::Integer, 0.0, f64::INFINITY);
        cmax.objective = 1.0;
        self.variables.push(cmax);

        for v in self.instance.all_vehicles() {
            for j in self.instance.all_nodes() {
                self.variables
                    .push(VarSpec::new(format!("X_{v}_{j}"), VarKind::Binary, 0.0, 1.0));
            }
        }

        for v in self.instance.all_vehicles() {
            for (j, k) in index.edge_pairs() {
                // a symmetric route with a single customer uses its depot edge twice
                let depot_edge = index.kind == MasterKind::Tsp && j == 0;
                let (kind, upper) = match (config.edge_domain, depot_edge) {
                    (EdgeDomain::Binary, false) => (VarKind::Binary, 1.0),
                    (EdgeDomain::Binary, true) => (VarKind::Integer, 2.0),
                    (EdgeDomain::Continuous, false) => (VarKind::Continuous, 1.0),
                    (EdgeDomain::Continuous, true) => (VarKind::Continuous, 2.0),
                };
                debug_assert_eq!(self.variables.len(), index.edge_index(v, j, k));
                self.variables
                    .push(VarSpec::new(format!("Y_{v}_{j}_{k}"), kind, 0.0, upper));
            }
        }

        if config.uses_mtz() {
            self.c_start = Some(self.variables.len());
            for j in self.instance.all_nodes() {
                self.variables
                    .push(VarSpec::new(format!("C_{j}"), VarKind::Integer, 0.0, f64::INFINITY));
            }
        }
    }

    /// (2) the weighted length of every route is at most `CMax`
    fn add_makespan_constraints(&mut self) {
        info!("Creating and setting constraints <= CMax (2)");
        let instance = self.instance;
        let index = self.index;
        for v in instance.all_vehicles() {
            let speed = instance.speed(v) as f64;
            let mut row = CutRow::new(Sense::Le, 0.0);
            match index.kind {
                MasterKind::Atsp => {
                    for j in instance.all_nodes() {
                        row.add_term(self.pseudo_process[j] as f64 * speed, index.node_index(v, j));
                        for k in instance.all_nodes_except(j) {
                            row.add_term(self.pseudo_setup[j][k] as f64 * speed, index.edge_index(v, j, k));
                        }
                    }
                }
                MasterKind::Tsp => {
                    for j in instance.all_nodes() {
                        for k in instance.all_nodes_after(j) {
                            row.add_term(instance.distance(j, k) as f64 * speed, index.edge_index(v, j, k));
                        }
                    }
                }
            }
            row.add_term(-1.0, IndexScheme::CMAX);
            self.constraints.push((format!("2_{v}"), row));
        }
    }

    /// (3) every customer is served by exactly one vehicle
    fn add_assignment_constraints(&mut self) {
        info!("Creating and setting constraints sum_i(Xij) = 1 (3)");
        for j in self.instance.all_customers() {
            let mut row = CutRow::new(Sense::Eq, 1.0);
            for v in self.instance.all_vehicles() {
                row.add_term(1.0, self.index.node_index(v, j));
            }
            self.constraints.push((format!("3_{j}"), row));
        }
    }

    /// (4) every vehicle starts at the depot
    fn add_depot_constraints(&mut self) {
        info!("Creating and setting constraints Xi0 = 1 (4)");
        for v in self.instance.all_vehicles() {
            let mut row = CutRow::new(Sense::Eq, 1.0);
            row.add_term(1.0, self.index.node_index(v, 0));
            self.constraints.push((format!("4_{v}"), row));
        }
    }

    /// (5) edges are selected around assigned nodes only
    fn add_degree_constraints(&mut self) {
        let instance = self.instance;
        let index = self.index;
        match index.kind {
            MasterKind::Atsp => {
                info!("Creating and setting constraints (5.1) Xij = sum_k(Yikj) and (5.2) Xij = sum_k(Yijk)");
                for v in instance.all_vehicles() {
                    for j in instance.all_nodes() {
                        let mut inflow = CutRow::new(Sense::Eq, 0.0);
                        inflow.add_term(-1.0, index.node_index(v, j));
                        for k in instance.all_nodes_except(j) {
                            inflow.add_term(1.0, index.edge_index(v, k, j));
                        }
                        trace!("Adding sum_k(Y_{{{v} k {j}}}) = X_{{{v} {j}}} with name 5.1_{v}_{j}");
                        self.constraints.push((format!("5.1_{v}_{j}"), inflow));

                        let mut outflow = CutRow::new(Sense::Eq, 0.0);
                        outflow.add_term(-1.0, index.node_index(v, j));
                        for k in instance.all_nodes_except(j) {
                            outflow.add_term(1.0, index.edge_index(v, j, k));
                        }
                        trace!("Adding sum_k(Y_{{{v} {j} k}}) = X_{{{v} {j}}} with name 5.2_{v}_{j}");
                        self.constraints.push((format!("5.2_{v}_{j}"), outflow));
                    }
                }
            }
            MasterKind::Tsp => {
                info!("Creating and setting constraints 2Xij = sum_k(Yikj) + sum_k(Yijk) (5)");
                for v in instance.all_vehicles() {
                    for j in instance.all_nodes() {
                        let mut row = CutRow::new(Sense::Eq, 0.0);
                        for k in instance.all_nodes_except(j) {
                            row.add_term(1.0, index.edge_index(v, j, k));
                        }
                        row.add_term(-2.0, index.node_index(v, j));
                        self.constraints.push((format!("5_{v}_{j}"), row));
                    }
                }
            }
        }
    }

    /// Customer edges of a vehicle form no cycle: fewer edges than assigned customers
    fn add_global_subtour_constraints(&mut self) {
        info!("Adding global SEC per vehicle based on node assignments");
        let instance = self.instance;
        let index = self.index;
        for v in instance.all_vehicles() {
            let mut row = CutRow::new(Sense::Le, -1.0);
            for j in instance.all_customers() {
                for k in instance.all_nodes_after(j) {
                    row.add_term(1.0, index.edge_index(v, j, k));
                }
                row.add_term(-1.0, index.node_index(v, j));
            }
            self.constraints.push((format!("SEC_global_{v}"), row));
        }
    }

    /// (6) Miller-Tucker-Zemlin arrival times
    fn add_ordering_constraints(&mut self) {
        info!("Creating and setting MTZ constraints C_k - C_j + V(1-Y_ijk) >= c_jk*s_i (6)");
        let Some(c_start) = self.c_start else {
            return;
        };
        let instance = self.instance;
        let index = self.index;
        let big_m = self.big_m as f64;

        let mut depot = CutRow::new(Sense::Eq, 0.0);
        depot.add_term(1.0, c_start);
        self.constraints.push(("6_0".to_string(), depot));

        let mut count = 1;
        for v in instance.all_vehicles() {
            for j in instance.all_nodes() {
                for k in instance.all_customers().filter(|&k| k != j) {
                    let mut row = CutRow::new(Sense::Ge, instance.weighted_distance(v, j, k) as f64 - big_m);
                    row.add_term(1.0, c_start + k);
                    row.add_term(-1.0, c_start + j);
                    row.add_term(-big_m, index.edge_index(v, j, k));
                    self.constraints.push((format!("6_{count}"), row));
                    count += 1;
                }
            }
        }
    }

    pub fn instance(&self) -> &'a Instance {
        self.instance
    }

    pub fn index(&self) -> &IndexScheme {
        &self.index
    }

    pub fn kind(&self) -> MasterKind {
        self.index.kind
    }

    pub fn variables(&self) -> &[VarSpec] {
        &self.variables
    }

    pub fn variable_name(&self, var: usize) -> &str {
        self.variables.get(var).map_or("?", |spec| spec.name.as_str())
    }

    pub fn constraints(&self) -> &[(String, CutRow)] {
        &self.constraints
    }

    /// Position of the arrival time C[j], if the model has ordering constraints
    pub fn arrival_index(&self, j: NodeId) -> Option<usize> {
        self.c_start.map(|start| start + j)
    }

    pub fn pseudo_process_time(&self, j: NodeId) -> Cost {
        self.pseudo_process[j]
    }

    pub fn pseudo_setup_time(&self, j: NodeId, k: NodeId) -> Cost {
        self.pseudo_setup[j][k]
    }

    pub fn big_m(&self) -> Cost {
        self.big_m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::line_instance;

    fn constraint<'m>(model: &'m MasterModel, name: &str) -> &'m CutRow {
        &model
            .constraints()
            .iter()
            .find(|(n, _)| n == name)
            .unwrap_or_else(|| panic!("no constraint {name}"))
            .1
    }

    #[test]
    fn symmetric_model_layout() {
        let instance = line_instance();
        let model = MasterModel::build(&instance, &SolverConfig::default());
        assert_eq!(model.variables().len(), 1 + 2 * 4 + 2 * 6);
        assert_eq!(model.variable_name(0), "Cmax");
        assert_eq!(model.variable_name(model.index().node_index(1, 2)), "X_1_2");
        assert_eq!(model.variable_name(model.index().edge_index(1, 3, 2)), "Y_1_2_3");
        assert_eq!(model.arrival_index(0), None);

        // 2 makespan, 3 assignment, 2 depot, 8 degree, 2 global SEC
        assert_eq!(model.constraints().len(), 2 + 3 + 2 + 8 + 2);
    }

    #[test]
    fn depot_edges_may_be_used_twice() {
        let instance = line_instance();
        let config = SolverConfig {
            edge_domain: EdgeDomain::Binary,
            ..Default::default()
        };
        let model = MasterModel::build(&instance, &config);
        let depot = &model.variables()[model.index().edge_index(0, 0, 2)];
        assert_eq!(depot.kind, VarKind::Integer);
        assert_eq!(depot.upper, 2.0);
        let customer = &model.variables()[model.index().edge_index(0, 1, 2)];
        assert_eq!(customer.kind, VarKind::Binary);
    }

    #[test]
    fn makespan_row_weights_edges_by_speed() {
        let instance = Instance::new(
            "speeds",
            vec![vec![0, 4, 6], vec![4, 0, 3], vec![6, 3, 0]],
            vec![3],
        )
        .unwrap();
        let model = MasterModel::build(&instance, &SolverConfig::default());
        let row = constraint(&model, "2_0");
        assert_eq!(row.sense, Sense::Le);
        assert!(row.terms.contains(&(model.index().edge_index(0, 1, 2), 9.0)));
        assert_eq!(row.terms.last(), Some(&(IndexScheme::CMAX, -1.0)));
    }

    #[test]
    fn pseudo_times_split_edges() {
        let instance = Instance::new(
            "pseudo",
            vec![vec![0, 4, 6], vec![4, 0, 3], vec![6, 3, 0]],
            vec![1],
        )
        .unwrap();
        let config = SolverConfig {
            master: MasterKind::Atsp,
            ..Default::default()
        };
        let model = MasterModel::build(&instance, &config);
        assert_eq!(model.pseudo_process_time(0), 4);
        assert_eq!(model.pseudo_process_time(2), 3);
        assert_eq!(model.pseudo_setup_time(0, 2), 2);
        assert_eq!(model.pseudo_setup_time(1, 1), 0);
        for j in 0..3 {
            for k in 0..3 {
                if j != k {
                    assert_eq!(
                        model.pseudo_process_time(j) + model.pseudo_setup_time(j, k),
                        instance.distance(j, k)
                    );
                }
            }
        }
    }

    #[test]
    fn asymmetric_model_with_ordering() {
        let instance = line_instance();
        let config = SolverConfig {
            master: MasterKind::Atsp,
            mtz: true,
            ..Default::default()
        };
        let model = MasterModel::build(&instance, &config);
        let c_start = 1 + 2 * 4 + 2 * 12;
        assert_eq!(model.variables().len(), c_start + 4);
        assert_eq!(model.arrival_index(3), Some(c_start + 3));
        assert_eq!(model.variable_name(c_start + 3), "C_3");
        assert_eq!(model.big_m(), 30 * 4 + 1);

        constraint(&model, "5.1_1_3");
        constraint(&model, "5.2_0_0");
        let depot = constraint(&model, "6_0");
        assert_eq!(depot.terms, vec![(c_start, 1.0)]);
        // per vehicle: 3 customers k, each with 3 predecessors j
        constraint(&model, "6_18");
        assert!(model.constraints().iter().all(|(name, _)| name != "6_19"));
    }

    #[test]
    fn global_subtour_row_counts_customer_edges() {
        let instance = line_instance();
        let model = MasterModel::build(&instance, &SolverConfig::default());
        let row = constraint(&model, "SEC_global_1");
        assert_eq!(row.rhs, -1.0);
        // customer pairs (1,2), (1,3), (2,3) and three assignments
        assert_eq!(row.terms.len(), 6);
    }
}
