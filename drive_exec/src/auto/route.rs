//! # Route module
//!
//! The route is the fixed global reference the vehicle drives along: an
//! ordered sequence of waypoints, each carrying the target speed at that point
//! and a marker identifying intersections and stop lines.
//!
//! Routes are either loaded directly from a CSV file (`x,y,speed[,marker]`
//! rows) or built from lane-centre mission nodes with a [`RouteBuilder`],
//! which shifts the nodes onto the driving lane and replaces turning
//! intersections with circular arcs.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{path::Path, str::FromStr};

use log::debug;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use util::maths::wrap_to_pi;

use super::geom::Circle;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single route waypoint.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct Waypoint {
    pub position_m: Vector2<f64>,

    /// Target speed when passing through this waypoint
    pub speed_ms: f64,

    pub marker: WaypointMarker,
}

/// The global reference route.
///
/// A route is never empty and contains only finite values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    waypoints: Vec<Waypoint>,

    /// Centres of the intersections along the route
    intersections_m: Vec<Vector2<f64>>,
}

/// A point found by walking along the route.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RoutePoint {
    pub position_m: Vector2<f64>,
    pub heading_rad: f64,

    /// Index of the waypoint at the start of the segment containing the point
    pub index: usize,
}

/// An axis aligned square region around an intersection.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Region {
    pub min_m: Vector2<f64>,
    pub max_m: Vector2<f64>,
}

/// A lane-centre node of a mission, as produced by a route search.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissionNode {
    pub position_m: Vector2<f64>,
    pub kind: WaypointMarker,
}

/// Parameters for [`RouteBuilder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteBuilderParams {
    /// Distance the driving lane lies to the right of the lane-centre nodes
    pub lane_offset_m: f64,

    /// Target speed away from turns
    pub desired_speed_ms: f64,

    /// Target speed through turns
    pub turn_speed_ms: f64,

    /// How far the arc's middle point lies along the line from the
    /// intersection centre (0) to the chord midpoint (1)
    pub turn_centering: f64,

    /// Number of waypoints after a turn which keep the turn speed
    pub turn_cooldown: usize,

    /// Number of waypoints sampled along each turning arc
    pub turn_samples: usize,

    /// Sine of the smallest direction change treated as a turn
    pub turn_threshold: f64,
}

/// Builds a drivable [`Route`] from mission nodes.
#[derive(Debug, Clone, Default)]
pub struct RouteBuilder {
    params: RouteBuilderParams,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Marks waypoints with a special meaning for the behaviour planner.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WaypointMarker {
    Lane,
    Intersection,
    StopLine,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("The route contains no waypoints")]
    Empty,

    #[error("Waypoint {0} contains a non-finite value")]
    NonFinite(usize),

    #[error("Could not read the route file: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid route row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("At least two mission nodes are required to build a route, got {0}")]
    TooFewNodes(usize),

    #[error("Could not fit a turning arc at mission node {0}")]
    DegenerateTurn(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Waypoint {
    pub fn new(x_m: f64, y_m: f64, speed_ms: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            speed_ms,
            marker: WaypointMarker::Lane,
        }
    }

    pub fn with_marker(mut self, marker: WaypointMarker) -> Self {
        self.marker = marker;
        self
    }
}

impl Default for WaypointMarker {
    fn default() -> Self {
        WaypointMarker::Lane
    }
}

impl FromStr for WaypointMarker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "lane" => Ok(WaypointMarker::Lane),
            "intersection" => Ok(WaypointMarker::Intersection),
            "stop" | "stop_line" => Ok(WaypointMarker::StopLine),
            other => Err(format!("unknown waypoint marker \"{}\"", other)),
        }
    }
}

impl Route {
    /// Create a new route from the given waypoints.
    ///
    /// Intersection centres are taken as the mean position of each run of
    /// consecutive `Intersection` waypoints.
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, RouteError> {
        let mut intersections_m = Vec::new();
        let mut run: Vec<Vector2<f64>> = Vec::new();

        for wp in waypoints.iter() {
            if wp.marker == WaypointMarker::Intersection {
                run.push(wp.position_m);
            } else if !run.is_empty() {
                intersections_m.push(mean(&run));
                run.clear();
            }
        }
        if !run.is_empty() {
            intersections_m.push(mean(&run));
        }

        Self::with_intersections(waypoints, intersections_m)
    }

    /// Create a new route with explicitly given intersection centres.
    pub fn with_intersections(
        waypoints: Vec<Waypoint>,
        intersections_m: Vec<Vector2<f64>>,
    ) -> Result<Self, RouteError> {
        if waypoints.is_empty() {
            return Err(RouteError::Empty);
        }

        for (i, wp) in waypoints.iter().enumerate() {
            if !(wp.position_m.x.is_finite()
                && wp.position_m.y.is_finite()
                && wp.speed_ms.is_finite())
            {
                return Err(RouteError::NonFinite(i));
            }
        }

        Ok(Self {
            waypoints,
            intersections_m,
        })
    }

    /// Load a route from a CSV file of `x,y,speed[,marker]` rows.
    ///
    /// Lines starting with `#` are ignored.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, RouteError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut waypoints = Vec::new();

        for (row, record) in reader.records().enumerate() {
            let record = record?;

            let field = |i: usize, name: &str| -> Result<f64, RouteError> {
                record
                    .get(i)
                    .ok_or_else(|| RouteError::InvalidRow {
                        row,
                        reason: format!("missing {}", name),
                    })?
                    .parse::<f64>()
                    .map_err(|e| RouteError::InvalidRow {
                        row,
                        reason: format!("invalid {}: {}", name, e),
                    })
            };

            let marker = match record.get(3) {
                Some(m) => m
                    .parse::<WaypointMarker>()
                    .map_err(|reason| RouteError::InvalidRow { row, reason })?,
                None => WaypointMarker::Lane,
            };

            waypoints.push(
                Waypoint::new(field(0, "x")?, field(1, "y")?, field(2, "speed")?)
                    .with_marker(marker),
            );
        }

        debug!("Loaded route with {} waypoints", waypoints.len());

        Self::new(waypoints)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Routes are never empty, this is provided for completeness.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.waypoints.len() - 1
    }

    /// The final waypoint of the route.
    pub fn last(&self) -> &Waypoint {
        &self.waypoints[self.last_index()]
    }

    /// Index of the waypoint closest to the given point.
    pub fn closest_index(&self, point_m: &Vector2<f64>) -> usize {
        let mut closest = 0;
        let mut closest_dist_m = std::f64::INFINITY;

        for (i, wp) in self.waypoints.iter().enumerate() {
            let dist_m = (wp.position_m - point_m).norm();
            if dist_m < closest_dist_m {
                closest_dist_m = dist_m;
                closest = i;
            }
        }

        closest
    }

    /// Heading of the route at the given waypoint.
    ///
    /// This is the heading of the segment leaving the waypoint, or of the
    /// segment arriving at it for the final waypoint.
    pub fn heading_at(&self, index: usize) -> f64 {
        let index = index.min(self.last_index());

        let (from, to) = if index < self.last_index() {
            (index, index + 1)
        } else if index > 0 {
            (index - 1, index)
        } else {
            return 0.0;
        };

        let d = self.waypoints[to].position_m - self.waypoints[from].position_m;
        d.y.atan2(d.x)
    }

    /// Arc length along the route between two waypoint indices.
    pub fn arc_length(&self, from: usize, to: usize) -> f64 {
        let to = to.min(self.last_index());
        if from >= to {
            return 0.0;
        }

        self.waypoints[from..=to]
            .windows(2)
            .map(|w| (w[1].position_m - w[0].position_m).norm())
            .sum()
    }

    /// Walk `distance_m` along the route starting at the waypoint `from`.
    ///
    /// Negative distances are treated as zero. Walking past the end of the
    /// route returns the final waypoint.
    pub fn point_at_distance(&self, from: usize, distance_m: f64) -> RoutePoint {
        let from = from.min(self.last_index());
        let mut remaining_m = distance_m.max(0.0);

        for i in from..self.last_index() {
            let start = self.waypoints[i].position_m;
            let delta = self.waypoints[i + 1].position_m - start;
            let seg_m = delta.norm();

            if remaining_m <= seg_m && seg_m > std::f64::EPSILON {
                return RoutePoint {
                    position_m: start + delta * (remaining_m / seg_m),
                    heading_rad: delta.y.atan2(delta.x),
                    index: i,
                };
            }

            remaining_m -= seg_m;
        }

        RoutePoint {
            position_m: self.last().position_m,
            heading_rad: self.heading_at(self.last_index()),
            index: self.last_index(),
        }
    }

    /// Index of the first `StopLine` waypoint in `from..=to`, if any.
    pub fn stop_line_between(&self, from: usize, to: usize) -> Option<usize> {
        let to = to.min(self.last_index());
        (from..=to).find(|&i| self.waypoints[i].marker == WaypointMarker::StopLine)
    }

    pub fn intersections(&self) -> &[Vector2<f64>] {
        &self.intersections_m
    }

    /// Squares of the given half size centred on each intersection.
    pub fn intersection_regions(&self, half_size_m: f64) -> Vec<Region> {
        self.intersections_m
            .iter()
            .map(|c| Region::around(c, half_size_m))
            .collect()
    }
}

impl Region {
    pub fn around(centre_m: &Vector2<f64>, half_size_m: f64) -> Self {
        let half = Vector2::new(half_size_m, half_size_m);
        Self {
            min_m: centre_m - half,
            max_m: centre_m + half,
        }
    }

    /// True if the point lies strictly inside the region.
    pub fn contains(&self, point_m: &Vector2<f64>) -> bool {
        self.min_m.x < point_m.x
            && point_m.x < self.max_m.x
            && self.min_m.y < point_m.y
            && point_m.y < self.max_m.y
    }
}

impl MissionNode {
    pub fn new(x_m: f64, y_m: f64, kind: WaypointMarker) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            kind,
        }
    }
}

impl Default for RouteBuilderParams {
    fn default() -> Self {
        Self {
            lane_offset_m: 1.5,
            desired_speed_ms: 5.0,
            turn_speed_ms: 2.5,
            turn_centering: 0.75,
            turn_cooldown: 4,
            turn_samples: 12,
            turn_threshold: 0.1,
        }
    }
}

impl RouteBuilder {
    pub fn new(params: RouteBuilderParams) -> Self {
        Self { params }
    }

    /// Build the route from the mission nodes.
    pub fn build(&self, nodes: &[MissionNode]) -> Result<Route, RouteError> {
        if nodes.len() < 2 {
            return Err(RouteError::TooFewNodes(nodes.len()));
        }

        let p = &self.params;
        let mut waypoints = Vec::with_capacity(nodes.len());
        let mut intersections_m = Vec::new();
        let mut cooldown = 0usize;

        waypoints.push(Waypoint {
            position_m: self.to_lane(&nodes[0].position_m, &direction(&nodes[0], &nodes[1])),
            speed_ms: p.desired_speed_ms,
            marker: nodes[0].kind,
        });

        for i in 1..nodes.len() {
            let node = &nodes[i];
            let dir_in = direction(&nodes[i - 1], node);

            if node.kind == WaypointMarker::Intersection {
                intersections_m.push(node.position_m);

                if let Some(next) = nodes.get(i + 1) {
                    let dir_out = direction(node, next);

                    if cross(&dir_in, &dir_out).abs() > p.turn_threshold {
                        self.push_turn(&mut waypoints, &nodes[i - 1], node, next, i)?;
                        cooldown = p.turn_cooldown;
                        continue;
                    }
                }
            }

            let speed_ms = if cooldown > 0 {
                cooldown -= 1;
                p.turn_speed_ms
            } else {
                p.desired_speed_ms
            };

            waypoints.push(Waypoint {
                position_m: self.to_lane(&node.position_m, &dir_in),
                speed_ms,
                marker: node.kind,
            });
        }

        debug!(
            "Built route of {} waypoints from {} nodes ({} intersections)",
            waypoints.len(),
            nodes.len(),
            intersections_m.len()
        );

        Route::with_intersections(waypoints, intersections_m)
    }

    /// Replace the corner at `centre` with an arc from the lane-corrected
    /// entry point to the lane-corrected exit point.
    fn push_turn(
        &self,
        waypoints: &mut Vec<Waypoint>,
        prev: &MissionNode,
        centre: &MissionNode,
        next: &MissionNode,
        index: usize,
    ) -> Result<(), RouteError> {
        let p = &self.params;

        let start = self.to_lane(&prev.position_m, &direction(prev, centre));
        let end = self.to_lane(&next.position_m, &direction(centre, next));

        // Slow down before entering the turn
        if let Some(last) = waypoints.last_mut() {
            last.speed_ms = p.turn_speed_ms;
        }

        let chord_mid = (start + end) / 2.0;
        let middle = chord_mid * p.turn_centering + centre.position_m * (1.0 - p.turn_centering);

        let circle =
            Circle::through(&start, &end, &middle).ok_or(RouteError::DegenerateTurn(index))?;

        let start_rad = circle.angle_of(&start);
        let sweep_rad = wrap_to_pi(circle.angle_of(&end) - start_rad);

        for k in 1..=p.turn_samples {
            let angle_rad = start_rad + sweep_rad * k as f64 / (p.turn_samples + 1) as f64;
            waypoints.push(Waypoint {
                position_m: circle.point_at(angle_rad),
                speed_ms: p.turn_speed_ms,
                marker: WaypointMarker::Intersection,
            });
        }

        Ok(())
    }

    /// Shift a lane-centre point onto the driving lane, to the right of the
    /// direction of travel.
    fn to_lane(&self, point_m: &Vector2<f64>, dir: &Vector2<f64>) -> Vector2<f64> {
        point_m + Vector2::new(dir.y, -dir.x) * self.params.lane_offset_m
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn direction(from: &MissionNode, to: &MissionNode) -> Vector2<f64> {
    let d = to.position_m - from.position_m;
    let n = d.norm();
    if n > std::f64::EPSILON {
        d / n
    } else {
        Vector2::zeros()
    }
}

fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

fn mean(points: &[Vector2<f64>]) -> Vector2<f64> {
    points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / points.len() as f64
}
