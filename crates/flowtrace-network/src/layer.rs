//! In-memory feature layers backed by an R\*-tree.
//!
//! [`LineLayerIndex`] and [`PointLayerIndex`] own their features and
//! answer rectangle queries through an [`rstar::RTree`] of bounding
//! boxes, which is what a GIS data provider does for a spatial filter.
//! Rectangle queries return features in insertion order so results are
//! reproducible from run to run.

use std::collections::HashMap;

use geo::BoundingRect;
use indexmap::IndexSet;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

use crate::provider::{LineLayer, PointLayer};
use crate::types::{Crs, FeatureId, LayerError, LineFeature, PointFeature, Rect};

/// R-tree entry: a feature's bounding box tagged with its slot in the
/// layer's feature vector.
type BoxEntry = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// R-tree entry for a point feature.
type PointEntry = GeomWithData<[f64; 2], usize>;

fn envelope(rect: &Rect) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y])
}

fn index_by_id(ids: impl Iterator<Item = FeatureId>) -> Result<HashMap<FeatureId, usize>, LayerError> {
    let mut by_id = HashMap::new();
    for (slot, id) in ids.enumerate() {
        if by_id.insert(id, slot).is_some() {
            return Err(LayerError::DuplicateId(id));
        }
    }
    Ok(by_id)
}

/// A line layer held in memory.
#[derive(Debug, Clone)]
pub struct LineLayerIndex {
    crs: Crs,
    features: Vec<LineFeature>,
    by_id: HashMap<FeatureId, usize>,
    tree: RTree<BoxEntry>,
    selection: IndexSet<FeatureId>,
}

impl LineLayerIndex {
    /// Build a layer from its features.
    ///
    /// Features whose geometry has no bounding box (empty geometries) are
    /// kept but never returned by rectangle queries.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::DuplicateId`] if two features share an id.
    pub fn new(crs: Crs, features: Vec<LineFeature>) -> Result<Self, LayerError> {
        let by_id = index_by_id(features.iter().map(|f| f.id))?;

        let entries: Vec<BoxEntry> = features
            .iter()
            .enumerate()
            .filter_map(|(slot, feature)| {
                feature.geometry.bounding_rect().map(|bbox| {
                    let min = bbox.min();
                    let max = bbox.max();
                    GeomWithData::new(
                        Rectangle::from_corners([min.x, min.y], [max.x, max.y]),
                        slot,
                    )
                })
            })
            .collect();

        log::debug!("{crs}: indexed {} line features", entries.len());

        Ok(Self {
            crs,
            features,
            by_id,
            tree: RTree::bulk_load(entries),
            selection: IndexSet::new(),
        })
    }

    /// Number of features in the layer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Replace the selection with `ids`, keeping their order.
    ///
    /// Unknown ids are ignored.
    pub fn select(&mut self, ids: impl IntoIterator<Item = FeatureId>) {
        self.selection = ids
            .into_iter()
            .filter(|id| self.by_id.contains_key(id))
            .collect();
    }

    /// Clear the selection.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }
}

impl LineLayer for LineLayerIndex {
    fn crs(&self) -> &Crs {
        &self.crs
    }

    fn feature(&self, id: FeatureId) -> Option<&LineFeature> {
        self.by_id.get(&id).map(|&slot| &self.features[slot])
    }

    fn query_rect(&self, rect: &Rect) -> Vec<&LineFeature> {
        let mut slots: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .map(|entry| entry.data)
            .collect();
        slots.sort_unstable();
        slots.into_iter().map(|slot| &self.features[slot]).collect()
    }

    fn selected_features(&self) -> Vec<&LineFeature> {
        self.selection
            .iter()
            .filter_map(|id| self.feature(*id))
            .collect()
    }

    fn features(&self) -> Vec<&LineFeature> {
        self.features.iter().collect()
    }
}

/// A point layer held in memory.
#[derive(Debug, Clone)]
pub struct PointLayerIndex {
    crs: Crs,
    features: Vec<PointFeature>,
    tree: RTree<PointEntry>,
}

impl PointLayerIndex {
    /// Build a layer from its features.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::DuplicateId`] if two features share an id.
    pub fn new(crs: Crs, features: Vec<PointFeature>) -> Result<Self, LayerError> {
        index_by_id(features.iter().map(|f| f.id))?;
        let entries: Vec<PointEntry> = features
            .iter()
            .enumerate()
            .map(|(slot, f)| GeomWithData::new([f.point.x, f.point.y], slot))
            .collect();
        log::debug!("{crs}: indexed {} point features", entries.len());
        Ok(Self {
            crs,
            features,
            tree: RTree::bulk_load(entries),
        })
    }

    /// Number of features in the layer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// All features of the layer.
    #[must_use]
    pub fn features(&self) -> &[PointFeature] {
        &self.features
    }
}

impl PointLayer for PointLayerIndex {
    fn crs(&self) -> &Crs {
        &self.crs
    }

    fn query_rect(&self, rect: &Rect) -> Vec<&PointFeature> {
        let mut slots: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .map(|entry| entry.data)
            .collect();
        slots.sort_unstable();
        slots.into_iter().map(|slot| &self.features[slot]).collect()
    }
}
