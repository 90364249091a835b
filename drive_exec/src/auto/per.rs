//! Perception module - extracts obstacles from the simulated agents and
//! wraps the traffic light detector

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use nalgebra::Vector2;
use ordered_float::OrderedFloat;
use serde::Deserialize;
use sim_if::{
    meas::{AgentKind, AgentMeasurement, Extent},
    tl::{TrafficLightLabel, TrafficLightReport},
};
use util::maths::abs_ang_dist;

use super::{geom::Transform2, loc::Pose, local_plan::LeadVehicle};

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// A source of traffic light observations.
///
/// The detector is handed whatever sensor frame it needs once per planning
/// tick, and returns `None` when no light is seen.
pub trait TrafficLightDetector {
    /// The sensor data the detector works on
    type Frame;

    fn detect(&mut self, frame: &Self::Frame) -> Option<TrafficLightReport>;
}

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerParams {
    /// Half size of the square around the ego inside which agents are
    /// considered
    pub view_range_m: f64,

    /// Maximum difference between the ego heading and a vehicle's heading
    /// for it to be a lead vehicle candidate
    pub lead_heading_tolerance_rad: f64,

    /// Depth reported when there is no traffic light
    pub no_light_depth_m: f64,
}

/// A detector which never sees a traffic light.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrafficLight;

/// A detector which passes through a traffic light report provided by the
/// simulation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportedTrafficLight;

/// A vehicle inside the view range.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleObstacle {
    pub position_m: Vector2<f64>,
    pub heading_rad: f64,
    pub speed_ms: f64,

    /// Boundary points of the vehicle's bounding box
    pub points_m: Vec<Vector2<f64>>,
}

/// Position and heading of a pedestrian inside the view range.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PedestrianInfo {
    pub position_m: Vector2<f64>,
    pub heading_rad: f64,
}

/// The agents around the ego, sorted by kind.
#[derive(Debug, Clone, Default)]
pub struct SortedAgents {
    pub vehicles: Vec<VehicleObstacle>,

    pub pedestrians: Vec<PedestrianInfo>,

    /// Boundary points of all pedestrians
    pub pedestrian_points_m: Vec<Vector2<f64>>,

    /// Index into `vehicles` of the lead vehicle candidate
    pub lead_candidate: Option<usize>,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Default for PerParams {
    fn default() -> Self {
        Self {
            view_range_m: 30.0,
            lead_heading_tolerance_rad: 25f64.to_radians(),
            no_light_depth_m: 1000.0,
        }
    }
}

impl TrafficLightDetector for NoTrafficLight {
    type Frame = ();

    fn detect(&mut self, _frame: &()) -> Option<TrafficLightReport> {
        None
    }
}

impl TrafficLightDetector for ReportedTrafficLight {
    type Frame = Option<TrafficLightReport>;

    fn detect(&mut self, frame: &Self::Frame) -> Option<TrafficLightReport> {
        *frame
    }
}

impl SortedAgents {
    pub fn lead_candidate(&self) -> Option<&VehicleObstacle> {
        self.vehicles.get(self.lead_candidate?)
    }

    /// The lead candidate as a [`LeadVehicle`].
    pub fn lead_vehicle(&self) -> Option<LeadVehicle> {
        self.lead_candidate().map(|v| LeadVehicle {
            position_m: v.position_m,
            speed_ms: v.speed_ms,
        })
    }

    /// Boundary points of all vehicles, leaving out the lead candidate if
    /// `exclude_lead` is set.
    pub fn vehicle_points(&self, exclude_lead: bool) -> Vec<Vector2<f64>> {
        self.vehicles
            .iter()
            .enumerate()
            .filter(|(i, _)| !(exclude_lead && Some(*i) == self.lead_candidate))
            .flat_map(|(_, v)| v.points_m.iter().copied())
            .collect()
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Boundary points of an oriented box: the four corners and the four edge
/// midpoints.
pub fn obstacle_to_world(position_m: &Vector2<f64>, yaw_rad: f64, extent: &Extent) -> Vec<Vector2<f64>> {
    let tf = Transform2::new(yaw_rad, *position_m);
    let (ex, ey) = (extent.x_m, extent.y_m);

    [
        (ex, ey),
        (ex, 0.0),
        (ex, -ey),
        (0.0, -ey),
        (-ex, -ey),
        (-ex, 0.0),
        (-ex, ey),
        (0.0, ey),
    ]
    .iter()
    .map(|&(x, y)| tf.apply_point(&Vector2::new(x, y)))
    .collect()
}

/// Sort the agents within the view range of the ego.
///
/// The lead vehicle candidate is the nearest vehicle ahead of the ego whose
/// heading is within the lead heading tolerance of the ego's.
pub fn sort_agents(ego: &Pose, agents: &[AgentMeasurement], params: &PerParams) -> SortedAgents {
    let mut sorted = SortedAgents::default();

    for agent in agents {
        let position_m = Vector2::new(agent.x_m, agent.y_m);
        let delta = position_m - ego.position_m;

        if delta.x.abs() >= params.view_range_m || delta.y.abs() >= params.view_range_m {
            continue;
        }

        let points_m = obstacle_to_world(&position_m, agent.yaw_rad, &agent.extent);

        match agent.kind {
            AgentKind::Vehicle => sorted.vehicles.push(VehicleObstacle {
                position_m,
                heading_rad: agent.yaw_rad,
                speed_ms: agent.forward_speed_ms,
                points_m,
            }),
            AgentKind::Pedestrian => {
                sorted.pedestrians.push(PedestrianInfo {
                    position_m,
                    heading_rad: agent.yaw_rad,
                });
                sorted.pedestrian_points_m.extend(points_m);
            }
        }
    }

    let forward = ego.forward2();
    sorted.lead_candidate = sorted
        .vehicles
        .iter()
        .enumerate()
        .filter(|(_, v)| {
            abs_ang_dist(v.heading_rad, ego.heading_rad) < params.lead_heading_tolerance_rad
                && (v.position_m - ego.position_m).dot(&forward) > 0.0
        })
        .min_by_key(|(_, v)| OrderedFloat((v.position_m - ego.position_m).norm()))
        .map(|(i, _)| i);

    sorted
}

/// Run the detector, replacing a missing detection or a `None` label with
/// the no-light depth.
pub fn observe_traffic_light<D: TrafficLightDetector>(
    detector: &mut D,
    frame: &D::Frame,
    no_light_depth_m: f64,
) -> TrafficLightReport {
    match detector.detect(frame) {
        Some(report) if report.label != TrafficLightLabel::None => report,
        _ => TrafficLightReport {
            label: TrafficLightLabel::None,
            depth_m: no_light_depth_m,
        },
    }
}
