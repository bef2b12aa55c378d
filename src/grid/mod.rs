//! Grid and material builder
//!
//! Turns the ordered layer list of a [`SimulationConfig`] into the 1-D
//! node array the solver works on. Depth `z` is positive downward with
//! the initial sediment–water interface at `z = 0`; deposition later
//! inserts nodes above it at negative coordinates.
//!
//! # Node placement
//!
//! Nodes are vertex-centered: each layer contributes its top node and
//! its interior points, and the deepest layer also contributes the
//! bottom node. A node on a layer interface belongs to the layer below
//! it, so material properties change exactly at the interface node.
//!
//! # Material mixing
//!
//! A layer is a volume-fraction mixture of solid components. Node
//! porosity, particle density and the tortuosity factor are
//! fraction-weighted over the mixture; the bulk (dry) density is
//! `(1 - e) · Σ fᵢ·ρᵢ`. Per-node component fractions start from the
//! layer definition and drift over time when bioturbation mixes
//! distinct materials; they must sum to 1 at all times.

use crate::config::{Bioturbation, Layer, LayerDiscretization, SimulationConfig};
use crate::error::SimulationError;

// =================================================================================================
// Node
// =================================================================================================

/// One spatial node with its local material properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Depth coordinate, positive downward \[L\]
    pub z: f64,
    /// Index of the owning layer in the configuration
    pub layer: usize,
    /// Mixture porosity
    pub porosity: f64,
    /// Mixture particle density \[M/L³\]
    pub particle_density: f64,
    /// Bulk dry density (1-e)·ρ \[M/L³\]
    pub bulk_density: f64,
    /// Tortuosity factor multiplying free-water diffusivity
    pub tortuosity_factor: f64,
    /// Longitudinal dispersivity α \[L\]
    pub dispersivity: f64,
    /// Porewater DOC concentration \[M/L³\]
    pub doc: f64,
    /// Particle bioturbation coefficient at this depth \[L²/T\]
    pub bio_particle: f64,
    /// Porewater bioturbation coefficient at this depth \[L²/T\]
    pub bio_porewater: f64,
    /// Volume fraction of each solid component (full component list;
    /// entries for components absent from the layer are zero).
    /// Invariant: sums to 1.
    pub fractions: Vec<f64>,
}

impl Node {
    /// Build a node from a layer definition at the given depth.
    fn from_layer(config: &SimulationConfig, layer_index: usize, z: f64) -> Self {
        let layer = &config.layers[layer_index];
        let n_components = config.components.len();

        let mut fractions = vec![0.0; n_components];
        let mut porosity = 0.0;
        let mut particle_density = 0.0;
        let mut tortuosity_factor = 0.0;

        for &(component, fraction) in &layer.components {
            fractions[component] += fraction;
            porosity += fraction * config.components[component].porosity;
            particle_density += fraction * config.components[component].density;
        }
        // Tortuosity is evaluated at the mixture porosity, weighted by
        // the component fractions.
        for &(component, fraction) in &layer.components {
            tortuosity_factor +=
                fraction * config.components[component].tortuosity.factor(porosity);
        }

        Self {
            z,
            layer: layer_index,
            porosity,
            particle_density,
            bulk_density: (1.0 - porosity) * particle_density,
            tortuosity_factor,
            dispersivity: layer.dispersivity,
            doc: layer.doc,
            bio_particle: 0.0,
            bio_porewater: 0.0,
            fractions,
        }
    }

    /// Mass fraction of each solid component, derived from the volume
    /// fractions and component particle densities.
    pub fn mass_fractions(&self, densities: &[f64]) -> Vec<f64> {
        let total: f64 = self
            .fractions
            .iter()
            .zip(densities)
            .map(|(f, rho)| f * rho)
            .sum();
        if total <= 0.0 {
            return vec![0.0; self.fractions.len()];
        }
        self.fractions
            .iter()
            .zip(densities)
            .map(|(f, rho)| f * rho / total)
            .collect()
    }
}

// =================================================================================================
// Grid
// =================================================================================================

/// The 1-D node grid, top node first.
#[derive(Debug, Clone)]
pub struct Grid {
    nodes: Vec<Node>,
    n_components: usize,
}

impl Grid {
    /// Build the grid from the configuration's layer stack.
    ///
    /// Fails with [`SimulationError::Configuration`] on dangling
    /// component references (the configuration should already have been
    /// validated, but the builder re-checks what it dereferences).
    pub fn build(config: &SimulationConfig) -> Result<Self, SimulationError> {
        let mut nodes = Vec::new();
        let mut z_top = 0.0;

        for (layer_index, layer) in config.layers.iter().enumerate() {
            for &(component, _) in &layer.components {
                if component >= config.components.len() {
                    return Err(SimulationError::config(format!(
                        "layer '{}' references undefined component index {}",
                        layer.name, component
                    )));
                }
            }

            let intervals = Self::interval_count(layer)?;
            let spacing = layer.thickness / intervals as f64;

            for i in 0..intervals {
                let z = z_top + i as f64 * spacing;
                nodes.push(Node::from_layer(config, layer_index, z));
            }
            z_top += layer.thickness;
        }

        // Bottom node of the deepest layer.
        let last_layer = config.layers.len() - 1;
        nodes.push(Node::from_layer(config, last_layer, z_top));

        let mut grid = Self {
            nodes,
            n_components: config.components.len(),
        };
        if let Some(bio) = &config.bioturbation {
            grid.update_bioturbation(bio);
        }
        Ok(grid)
    }

    fn interval_count(layer: &Layer) -> Result<usize, SimulationError> {
        match layer.discretization {
            LayerDiscretization::NodeCount(n) if n > 0 => Ok(n),
            LayerDiscretization::FixedSpacing(h) if h > 0.0 => {
                Ok((layer.thickness / h).ceil().max(1.0) as usize)
            }
            _ => Err(SimulationError::config(format!(
                "layer '{}' has an invalid discretization",
                layer.name
            ))),
        }
    }

    // ========================================= Queries ==========================================

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut Node {
        &mut self.nodes[index]
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Depth of the current surface (top node).
    pub fn surface(&self) -> f64 {
        self.nodes[0].z
    }

    /// Depth of the bottom node.
    pub fn bottom(&self) -> f64 {
        self.nodes[self.nodes.len() - 1].z
    }

    /// Depth coordinates of all nodes, top first.
    pub fn depths(&self) -> Vec<f64> {
        self.nodes.iter().map(|n| n.z).collect()
    }

    /// Spacing between node `j` and node `j + 1`.
    pub fn spacing(&self, j: usize) -> f64 {
        self.nodes[j + 1].z - self.nodes[j].z
    }

    /// Control-volume width of node `j` (half-cells at the ends).
    pub fn cell_width(&self, j: usize) -> f64 {
        let n = self.nodes.len();
        if n == 1 {
            return 0.0;
        }
        if j == 0 {
            0.5 * self.spacing(0)
        } else if j == n - 1 {
            0.5 * self.spacing(n - 2)
        } else {
            0.5 * (self.spacing(j - 1) + self.spacing(j))
        }
    }

    // ===================================== Time-dependent updates ================================

    /// Recompute per-node bioturbation coefficients from the profile
    /// and the current surface position. Called at build time and after
    /// every deposition event (the profile is anchored to the surface).
    pub fn update_bioturbation(&mut self, bio: &Bioturbation) {
        let surface = self.surface();
        for node in &mut self.nodes {
            let depth_below_surface = node.z - surface;
            let weight = bio.weight(depth_below_surface);
            node.bio_particle = bio.particle_coefficient * weight;
            node.bio_porewater = bio.porewater_coefficient * weight;
        }
    }

    /// Insert a freshly deposited node above the current surface.
    ///
    /// The node takes the deposition layer's material definition; its
    /// depth is one deposition cell above the current top.
    pub fn push_surface_node(&mut self, config: &SimulationConfig, layer_index: usize, cell: f64) {
        let z = self.surface() - cell;
        let node = Node::from_layer(config, layer_index, z);
        self.nodes.insert(0, node);
    }

    /// Verify the component-fraction invariant on every node.
    pub fn check_fraction_sums(&self, tolerance: f64) -> Result<(), SimulationError> {
        for (j, node) in self.nodes.iter().enumerate() {
            let sum: f64 = node.fractions.iter().sum();
            if (sum - 1.0).abs() > tolerance {
                return Err(SimulationError::config(format!(
                    "node {} component fractions sum to {}, expected 1",
                    j, sum
                )));
            }
        }
        Ok(())
    }
}

// =================================================================================================
// Tests
// =================================================================================================
