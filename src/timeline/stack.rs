//! Ordered layer collection with shared cursors and compositing.
//!
//! Index 0 is the topmost layer. Compositing walks from the bottom (last
//! index) to the top so higher layers paint over lower ones.
//!
//! Every structural operation commits all pending transactions first, so a
//! snapshot taken afterwards never contains staged pixels.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{ChangeSet, Grid, IdGenerator, Layer, LayerState, SequentialIds, TimelineError};
use crate::schema::{CanvasConfig, Dimensions, Palette, Rgba};

/// Serializable snapshot of a whole stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackState {
    pub current_frame: usize,
    pub current_layer: usize,
    pub layers: Vec<LayerState>,
}

/// Stack-level errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    #[error("To merge layers, you must have a layer below the current selection")]
    NoLayerBelow,
    #[error("Stack already holds the maximum of {max} layers")]
    TooManyLayers { max: usize },
    #[error("Layer order must list every layer id exactly once")]
    InvalidOrder,
    #[error("Layer index {index} is outside a stack of {len} layers")]
    LayerOutOfRange { index: usize, len: usize },
    #[error("Snapshot contains no layers")]
    EmptyState,
    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

pub struct LayerStack {
    dims: Dimensions,
    max_layers: usize,
    layers: Vec<Layer>,
    current_layer: usize,
    current_frame: usize,
    ids: Box<dyn IdGenerator>,
    changes: ChangeSet,
}

impl std::fmt::Debug for LayerStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerStack")
            .field("dims", &self.dims)
            .field("max_layers", &self.max_layers)
            .field("layers", &self.layers.len())
            .field("current_layer", &self.current_layer)
            .field("current_frame", &self.current_frame)
            .finish()
    }
}

impl LayerStack {
    /// Create a stack with one empty layer named "1".
    pub fn new(config: &CanvasConfig) -> Self {
        Self::with_ids(config, Box::new(SequentialIds::new()))
    }

    /// Create a stack drawing layer ids from `ids`.
    pub fn with_ids(config: &CanvasConfig, ids: Box<dyn IdGenerator>) -> Self {
        let mut stack = Self {
            dims: config.dimensions(),
            max_layers: config.max_layers,
            layers: Vec::new(),
            current_layer: 0,
            current_frame: 0,
            ids,
            changes: ChangeSet::default(),
        };
        let layer = stack.new_layer();
        stack.layers.push(layer);
        stack
    }

    #[inline]
    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    #[inline]
    pub fn max_layers(&self) -> usize {
        self.max_layers
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false: a stack keeps at least one layer.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    #[inline]
    pub fn current_layer_index(&self) -> usize {
        self.current_layer
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn current_layer(&self) -> &Layer {
        &self.layers[self.current_layer]
    }

    pub fn current_layer_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.current_layer]
    }

    /// Id not used by any layer in the stack.
    fn fresh_id(&mut self) -> String {
        loop {
            let id = self.ids.next_id();
            if !self.layers.iter().any(|l| l.id() == id) {
                return id;
            }
        }
    }

    /// One more than the largest numeric layer name.
    fn next_name(&self) -> String {
        let max = self
            .layers
            .iter()
            .filter_map(|l| l.name().parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        (max + 1).to_string()
    }

    fn new_layer(&mut self) -> Layer {
        let id = self.fresh_id();
        let name = self.next_name();
        Layer::new(self.dims, id, name)
    }

    fn check_index(&self, index: usize) -> Result<(), StackError> {
        if index >= self.layers.len() {
            return Err(StackError::LayerOutOfRange {
                index,
                len: self.layers.len(),
            });
        }
        Ok(())
    }

    fn check_capacity(&self) -> Result<(), StackError> {
        if self.layers.len() >= self.max_layers {
            warn!("layer cap of {} reached", self.max_layers);
            return Err(StackError::TooManyLayers {
                max: self.max_layers,
            });
        }
        Ok(())
    }

    /// True while any layer has staged, uncommitted pixels.
    pub fn has_transaction(&self) -> bool {
        self.layers.iter().any(Layer::has_transaction)
    }

    /// Commit every layer's active transaction.
    pub fn commit_transactions(&mut self) {
        for layer in &mut self.layers {
            layer.commit_transaction();
        }
    }

    /// Move the shared frame cursor, clamped to the timeline.
    pub fn set_current_frame(&mut self, frame: usize) {
        let frame = frame.min(self.dims.frames - 1);
        if frame == self.current_frame {
            return;
        }
        self.commit_transactions();
        self.current_frame = frame;
    }

    /// Select a layer, clamped to the stack.
    pub fn set_current_layer(&mut self, index: usize) {
        if index == self.current_layer {
            return;
        }
        self.commit_transactions();
        self.current_layer = index.min(self.layers.len() - 1);
    }

    /// Reorder the stack to match `order`, a permutation of the layer ids.
    /// The current layer stays selected.
    pub fn reorder<S: AsRef<str>>(&mut self, order: &[S]) -> Result<(), StackError> {
        if order.len() != self.layers.len() {
            return Err(StackError::InvalidOrder);
        }
        let mut positions = Vec::with_capacity(order.len());
        for id in order {
            let position = self
                .layers
                .iter()
                .position(|l| l.id() == id.as_ref())
                .ok_or(StackError::InvalidOrder)?;
            if positions.contains(&position) {
                return Err(StackError::InvalidOrder);
            }
            positions.push(position);
        }

        self.commit_transactions();
        let selected = self.current_layer().id().to_owned();
        let mut slots: Vec<Option<Layer>> = self.layers.drain(..).map(Some).collect();
        self.layers = positions
            .into_iter()
            .filter_map(|p| slots[p].take())
            .collect();
        self.current_layer = self
            .layers
            .iter()
            .position(|l| l.id() == selected)
            .unwrap_or(0);

        self.changes.merge(ChangeSet::ALL);
        debug!("layers reordered");
        Ok(())
    }

    /// Insert a fresh layer at `index` (clamped) and select it.
    pub fn insert_layer(&mut self, index: usize) -> Result<usize, StackError> {
        self.check_capacity()?;
        self.commit_transactions();

        let index = index.min(self.layers.len());
        let layer = self.new_layer();
        debug!("insert layer {} ({}) at {}", layer.id(), layer.name(), index);
        self.layers.insert(index, layer);
        self.current_layer = index;
        self.changes.merge(ChangeSet::ALL);
        Ok(index)
    }

    /// Insert a copy of the current layer above it. The copy becomes current.
    pub fn duplicate_layer(&mut self) -> Result<(), StackError> {
        self.check_capacity()?;
        self.commit_transactions();

        let id = self.fresh_id();
        let name = self.next_name();
        let copy = self.current_layer().duplicate(id, name);
        debug!(
            "duplicate layer {} as {}",
            self.current_layer().id(),
            copy.id()
        );
        self.layers.insert(self.current_layer, copy);
        self.changes.merge(ChangeSet::ALL);
        Ok(())
    }

    /// Remove the current layer. The stack is refilled with a fresh layer if
    /// it would become empty.
    pub fn remove_layer(&mut self) {
        self.commit_transactions();
        let removed = self.layers.remove(self.current_layer);
        debug!("remove layer {}", removed.id());

        if self.current_layer == self.layers.len() && self.current_layer != 0 {
            self.current_layer -= 1;
        }
        if self.layers.is_empty() {
            let layer = self.new_layer();
            self.layers.push(layer);
        }
        self.changes.merge(ChangeSet::ALL);
    }

    /// Merge the current layer into the one below it and remove it.
    pub fn merge_down(&mut self) -> Result<(), StackError> {
        if self.current_layer + 1 >= self.layers.len() {
            warn!("merge down without a layer below");
            return Err(StackError::NoLayerBelow);
        }
        self.commit_transactions();

        let (upper, lower) = self.layers.split_at_mut(self.current_layer + 1);
        lower[0].merge_layer(&upper[self.current_layer]);
        self.remove_layer();
        Ok(())
    }

    pub fn set_visibility(&mut self, index: usize, visible: bool) -> Result<(), StackError> {
        self.check_index(index)?;
        self.layers[index].set_visibility(visible);
        Ok(())
    }

    pub fn rename(&mut self, index: usize, name: impl Into<String>) -> Result<(), StackError> {
        self.check_index(index)?;
        self.layers[index].set_name(name);
        Ok(())
    }

    /// Palette indices of the current frame with every visible layer applied.
    pub fn composite(&self) -> Grid {
        let mut grid = Grid::blank(self.dims.cols, self.dims.rows);
        for layer in self.layers.iter().rev().filter(|l| l.is_visible()) {
            layer.merge_into(&mut grid, self.current_frame);
        }
        grid
    }

    /// [`composite`](Self::composite) resolved through `palette`.
    pub fn composite_rgba(&self, palette: &Palette) -> Vec<Rgba> {
        self.composite()
            .cells()
            .iter()
            .map(|&index| palette.rgba(index))
            .collect()
    }

    /// Throwaway layer holding every layer merged, top of the stack last.
    pub fn flatten(&mut self) -> Layer {
        self.commit_transactions();
        let mut flat = Layer::new(self.dims, "flat", "1");
        for layer in self.layers.iter().rev() {
            flat.merge_layer(layer);
        }
        flat.take_changes();
        flat
    }

    /// Back to a single empty layer named "1" with both cursors at 0.
    pub fn reset(&mut self) {
        self.layers.clear();
        let layer = self.new_layer();
        self.layers.push(layer);
        self.current_frame = 0;
        self.current_layer = 0;
        self.changes.merge(ChangeSet::ALL);
    }

    /// Drain the stack's own and every layer's change flags.
    pub fn take_changes(&mut self) -> ChangeSet {
        let mut changes = self.changes.take();
        for layer in &mut self.layers {
            changes.merge(layer.take_changes());
        }
        changes
    }

    /// Mark the end of an edit made outside a transaction, such as a brush
    /// stroke through [`Layer::put_pixel`].
    pub fn notify_commit(&mut self) {
        self.changes.merge(ChangeSet::ALL);
    }

    /// Fully committed snapshot.
    pub fn get_state(&mut self) -> StackState {
        self.commit_transactions();
        StackState {
            current_frame: self.current_frame,
            current_layer: self.current_layer,
            layers: self.layers.iter().map(Layer::get_state).collect(),
        }
    }

    /// Replace the whole stack. On error the stack is left untouched.
    pub fn set_state(&mut self, state: StackState) -> Result<(), StackError> {
        if state.layers.is_empty() {
            return Err(StackError::EmptyState);
        }
        if state.layers.len() > self.max_layers {
            warn!(
                "snapshot of {} layers exceeds the cap of {}",
                state.layers.len(),
                self.max_layers
            );
            return Err(StackError::TooManyLayers {
                max: self.max_layers,
            });
        }
        let layers = state
            .layers
            .into_iter()
            .map(|s| Layer::from_state(self.dims, s))
            .collect::<Result<Vec<_>, _>>()?;

        self.current_frame = state.current_frame.min(self.dims.frames - 1);
        self.current_layer = state.current_layer.min(layers.len() - 1);
        self.layers = layers;
        self.changes.timeline = true;
        debug!("stack state restored ({} layers)", self.layers.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Rect;

    fn config() -> CanvasConfig {
        CanvasConfig {
            cols: 4,
            rows: 4,
            frames: 3,
            max_layers: 3,
            ..Default::default()
        }
    }

    fn names(stack: &LayerStack) -> Vec<&str> {
        stack.layers().iter().map(Layer::name).collect()
    }

    #[test]
    fn test_new_stack_has_one_layer() {
        let stack = LayerStack::new(&config());
        assert_eq!(stack.len(), 1);
        assert_eq!(names(&stack), vec!["1"]);
        assert_eq!(stack.current_layer().id(), "1");
    }

    #[test]
    fn test_insert_respects_cap_and_naming() {
        let mut stack = LayerStack::new(&config());
        assert_eq!(stack.insert_layer(0).unwrap(), 0);
        assert_eq!(stack.insert_layer(10).unwrap(), 2);
        assert_eq!(names(&stack), vec!["2", "1", "3"]);
        assert_eq!(stack.current_layer_index(), 2);
        assert_eq!(
            stack.insert_layer(0),
            Err(StackError::TooManyLayers { max: 3 })
        );
        assert_eq!(stack.duplicate_layer(), Err(StackError::TooManyLayers { max: 3 }));
    }

    #[test]
    fn test_duplicate_inserts_copy_above() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 9, 0, 0, 1, None);
        stack.duplicate_layer().unwrap();

        assert_eq!(names(&stack), vec!["2", "1"]);
        assert_eq!(stack.current_layer_index(), 0);
        assert_eq!(stack.layers()[0].get_pixel(0, 0, 0), 9);
        assert_ne!(stack.layers()[0].id(), stack.layers()[1].id());
    }

    #[test]
    fn test_remove_keeps_one_layer() {
        let mut stack = LayerStack::new(&config());
        stack.insert_layer(1).unwrap();
        stack.remove_layer();
        assert_eq!(stack.current_layer_index(), 0);
        assert_eq!(names(&stack), vec!["1"]);

        stack.remove_layer();
        assert_eq!(stack.len(), 1);
        assert_eq!(names(&stack), vec!["1"]);
    }

    #[test]
    fn test_merge_down() {
        let mut stack = LayerStack::new(&config());
        assert_eq!(stack.merge_down(), Err(StackError::NoLayerBelow));

        stack.current_layer_mut().put_pixel(0, 7, 1, 0, 1, None);
        stack.insert_layer(0).unwrap();
        stack.current_layer_mut().put_pixel(0, 5, 0, 0, 1, None);
        stack.current_layer_mut().put_pixel(0, 5, 1, 0, 1, None);

        stack.merge_down().unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(names(&stack), vec!["1"]);
        let layer = stack.current_layer();
        assert_eq!(layer.get_pixel(0, 0, 0), 5);
        assert_eq!(layer.get_pixel(0, 1, 0), 5);
    }

    #[test]
    fn test_merge_down_without_layer_below_keeps_transaction() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().start_transaction();
        stack.current_layer_mut().put_pixel(0, 4, 1, 1, 1, None);

        assert_eq!(stack.merge_down(), Err(StackError::NoLayerBelow));
        assert!(stack.current_layer().has_transaction());
        assert!(stack.current_layer().pixels(0).is_none());
    }

    #[test]
    fn test_composite_precedence_and_visibility() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 7, 0, 0, 1, None);
        stack.current_layer_mut().put_pixel(0, 7, 1, 0, 1, None);
        stack.insert_layer(0).unwrap();
        stack.current_layer_mut().put_pixel(0, 5, 0, 0, 1, None);

        let grid = stack.composite();
        assert_eq!(grid.get(0, 0), 5);
        assert_eq!(grid.get(1, 0), 7);
        assert_eq!(grid.get(2, 0), 0);

        stack.set_visibility(0, false).unwrap();
        assert_eq!(stack.composite().get(0, 0), 7);
        assert!(stack.set_visibility(5, false).is_err());
    }

    #[test]
    fn test_composite_includes_staged_overlay() {
        let mut stack = LayerStack::new(&config());
        let layer = stack.current_layer_mut();
        layer.put_pixel(0, 4, 0, 0, 1, None);
        layer
            .start_transaction_from_selection(0, Rect::new(0, 0, 1, 1))
            .unwrap();
        layer.translate_transaction(2, 1);

        let grid = stack.composite();
        assert_eq!(grid.get(0, 0), 0);
        assert_eq!(grid.get(2, 1), 4);
    }

    #[test]
    fn test_composite_rgba() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 8, 0, 0, 1, None);
        let pixels = stack.composite_rgba(&Palette::generated());
        assert_eq!(pixels.len(), 16);
        assert_eq!(pixels[0], Rgba::opaque([255, 255, 255]));
        assert_eq!(pixels[1], Rgba::TRANSPARENT);
    }

    #[test]
    fn test_reorder_keeps_selection() {
        let mut stack = LayerStack::new(&config());
        stack.insert_layer(0).unwrap();
        stack.insert_layer(0).unwrap();
        // ids top to bottom: 3, 2, 1
        stack.set_current_layer(1);

        stack.reorder(&["1", "3", "2"]).unwrap();
        let ids: Vec<&str> = stack.layers().iter().map(Layer::id).collect();
        assert_eq!(ids, vec!["1", "3", "2"]);
        assert_eq!(stack.current_layer().id(), "2");

        assert_eq!(stack.reorder(&["1", "1", "2"]), Err(StackError::InvalidOrder));
        assert_eq!(stack.reorder(&["1", "3"]), Err(StackError::InvalidOrder));
        assert_eq!(stack.reorder(&["1", "3", "x"]), Err(StackError::InvalidOrder));
    }

    #[test]
    fn test_structural_ops_commit_transactions() {
        let mut stack = LayerStack::new(&config());
        let layer = stack.current_layer_mut();
        layer.start_transaction();
        layer.put_pixel(0, 3, 2, 2, 1, None);

        assert!(stack.has_transaction());
        stack.set_current_frame(1);
        assert!(!stack.has_transaction());
        assert_eq!(stack.current_layer().get_pixel(1, 2, 2), 3);

        stack.current_layer_mut().start_transaction();
        let state = stack.get_state();
        assert!(state.layers[0].transaction.is_none());
    }

    #[test]
    fn test_cursors_clamp() {
        let mut stack = LayerStack::new(&config());
        stack.set_current_frame(99);
        assert_eq!(stack.current_frame(), 2);
        stack.set_current_layer(99);
        assert_eq!(stack.current_layer_index(), 0);
    }

    #[test]
    fn test_flatten_top_paints_last() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 7, 0, 0, 1, None);
        stack.insert_layer(0).unwrap();
        stack.current_layer_mut().put_pixel(1, 5, 0, 0, 1, None);

        let flat = stack.flatten();
        assert_eq!(flat.get_pixel(0, 0, 0), 7);
        assert_eq!(flat.get_pixel(1, 0, 0), 5);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_state_round_trip() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(2, 1, 3, 3, 1, None);
        stack.insert_layer(1).unwrap();
        stack.set_current_frame(2);
        let state = stack.get_state();

        let mut other = LayerStack::new(&config());
        other.set_state(state.clone()).unwrap();
        assert_eq!(other.get_state(), state);
        assert_eq!(other.current_frame(), 2);
        assert_eq!(other.current_layer_index(), 1);
    }

    #[test]
    fn test_set_state_failure_leaves_stack_untouched() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 1, 0, 0, 1, None);
        let before = stack.get_state();

        let empty = StackState {
            current_frame: 0,
            current_layer: 0,
            layers: Vec::new(),
        };
        assert_eq!(stack.set_state(empty), Err(StackError::EmptyState));

        let mut bad = before.clone();
        bad.layers[0].frames.push(None);
        assert!(matches!(
            stack.set_state(bad),
            Err(StackError::Timeline(TimelineError::FrameCountMismatch { .. }))
        ));
        assert_eq!(stack.get_state(), before);
    }

    #[test]
    fn test_set_state_enforces_layer_cap() {
        let mut stack = LayerStack::new(&config());
        let before = stack.get_state();

        let mut crowded = before.clone();
        let template = crowded.layers[0].clone();
        crowded.layers = (1..=4)
            .map(|i| LayerState {
                id: i.to_string(),
                ..template.clone()
            })
            .collect();
        assert_eq!(
            stack.set_state(crowded),
            Err(StackError::TooManyLayers { max: 3 })
        );
        assert_eq!(stack.get_state(), before);
    }

    #[test]
    fn test_set_state_rejects_malformed_grids() {
        let json = |cells: &str| {
            format!(
                r#"{{"current_frame":0,"current_layer":0,"layers":[{{"id":"1","name":"1","frames":[{{"cols":4,"rows":4,"cells":{cells}}},null,null]}}]}}"#
            )
        };
        assert!(serde_json::from_str::<StackState>(&json("[]")).is_err());
        assert!(serde_json::from_str::<StackState>(&json(&format!("{:?}", vec![64u8; 16]))).is_err());
        let ok: StackState = serde_json::from_str(&json(&format!("{:?}", vec![2u8; 16]))).unwrap();

        let mut stack = LayerStack::new(&config());
        stack.set_state(ok.clone()).unwrap();
        assert_eq!(stack.composite().get(3, 3), 2);

        let mut bad = ok;
        if let Some(grid) = bad.layers[0].frames[0].as_mut() {
            grid.set(0, 0, 70);
        }
        assert_eq!(
            stack.set_state(bad),
            Err(StackError::Timeline(TimelineError::InvalidColor(70)))
        );
        assert_eq!(stack.composite().get(0, 0), 2);
    }

    #[test]
    fn test_new_ids_avoid_loaded_ids() {
        let mut stack = LayerStack::new(&config());
        let mut state = stack.get_state();
        state.layers[0].id = "2".into();
        stack.set_state(state).unwrap();

        stack.insert_layer(0).unwrap();
        let ids: Vec<&str> = stack.layers().iter().map(Layer::id).collect();
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[test]
    fn test_take_changes_collects_layers() {
        let mut stack = LayerStack::new(&config());
        assert!(stack.take_changes().is_empty());

        stack.current_layer_mut().put_pixel(0, 1, 0, 0, 1, None);
        assert_eq!(stack.take_changes(), ChangeSet::ALL);

        stack.current_layer_mut().put_pixel(0, 2, 0, 0, 1, None);
        assert!(stack.take_changes().is_empty());
        stack.notify_commit();
        assert!(stack.take_changes().commit);
    }

    #[test]
    fn test_reset() {
        let mut stack = LayerStack::new(&config());
        stack.insert_layer(0).unwrap();
        stack.set_current_frame(2);
        stack.reset();
        assert_eq!(names(&stack), vec!["1"]);
        assert_eq!(stack.current_frame(), 0);
    }
}
