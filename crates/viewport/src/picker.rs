use foundation::bounds::BoundingBox;
use serde::{Deserialize, Serialize};

/// The user's saved "my area" rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AreaPickerState {
    pub id: Option<u64>,
    pub bounds: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PickerError {
    #[error("zoom {zoom} is below the area picker minimum {min}")]
    ZoomTooLow { zoom: f64, min: f64 },
    #[error("no area edit in progress")]
    NotEditing,
    #[error("no area drawn yet")]
    NoDraft,
    #[error("area bounds are degenerate")]
    DegenerateBounds,
    #[error("no area save in progress")]
    NotSaving,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Edit {
    Idle,
    Editing { draft: Option<BoundingBox> },
    Saving { bounds: BoundingBox },
}

/// Edit workflow for the area rectangle.
///
/// The committed state changes only through `save` + `confirm_saved`. It
/// shares the zoom signal with the tile system: settling below `min_zoom`
/// cancels an open edit.
#[derive(Debug, Clone)]
pub struct AreaPicker {
    state: AreaPickerState,
    min_zoom: f64,
    edit: Edit,
}

impl AreaPicker {
    pub fn new(min_zoom: f64, state: AreaPickerState) -> Self {
        Self {
            state,
            min_zoom,
            edit: Edit::Idle,
        }
    }

    pub fn state(&self) -> &AreaPickerState {
        &self.state
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.edit, Edit::Editing { .. })
    }

    pub fn is_saving(&self) -> bool {
        matches!(self.edit, Edit::Saving { .. })
    }

    pub fn draft(&self) -> Option<BoundingBox> {
        match self.edit {
            Edit::Editing { draft } => draft,
            Edit::Saving { bounds } => Some(bounds),
            Edit::Idle => None,
        }
    }

    /// Open an edit session, seeded with the saved bounds.
    pub fn begin_edit(&mut self, zoom: f64) -> Result<(), PickerError> {
        if zoom < self.min_zoom {
            return Err(PickerError::ZoomTooLow {
                zoom,
                min: self.min_zoom,
            });
        }
        self.edit = Edit::Editing {
            draft: self.state.bounds,
        };
        Ok(())
    }

    pub fn update_draft(&mut self, bounds: BoundingBox) -> Result<(), PickerError> {
        let Edit::Editing { draft } = &mut self.edit else {
            return Err(PickerError::NotEditing);
        };
        if bounds.is_degenerate() {
            return Err(PickerError::DegenerateBounds);
        }
        *draft = Some(bounds);
        Ok(())
    }

    /// Freeze the draft for persisting. Returns the id to update (if any)
    /// and the bounds to store.
    pub fn save(&mut self) -> Result<(Option<u64>, BoundingBox), PickerError> {
        let Edit::Editing { draft } = self.edit else {
            return Err(PickerError::NotEditing);
        };
        let bounds = draft.ok_or(PickerError::NoDraft)?;
        self.edit = Edit::Saving { bounds };
        Ok((self.state.id, bounds))
    }

    /// Commit a save the backend accepted.
    pub fn confirm_saved(&mut self, id: u64) -> Result<AreaPickerState, PickerError> {
        let Edit::Saving { bounds } = self.edit else {
            return Err(PickerError::NotSaving);
        };
        self.state = AreaPickerState {
            id: Some(id),
            bounds: Some(bounds),
        };
        self.edit = Edit::Idle;
        Ok(self.state)
    }

    /// Return to editing after a failed save, keeping the draft.
    pub fn abort_save(&mut self) -> Result<(), PickerError> {
        let Edit::Saving { bounds } = self.edit else {
            return Err(PickerError::NotSaving);
        };
        self.edit = Edit::Editing {
            draft: Some(bounds),
        };
        Ok(())
    }

    /// Drop an open edit. Returns whether one was open.
    pub fn cancel(&mut self) -> bool {
        if self.is_editing() {
            self.edit = Edit::Idle;
            return true;
        }
        false
    }

    /// Zoom-end hook. Returns `true` if an open edit was cancelled.
    pub fn on_zoom(&mut self, zoom: f64) -> bool {
        zoom < self.min_zoom && self.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::{AreaPicker, AreaPickerState, PickerError};
    use foundation::bounds::BoundingBox;

    fn area() -> BoundingBox {
        BoundingBox::new(25.0, 121.4, 25.1, 121.6)
    }

    #[test]
    fn edit_save_confirm() {
        let mut p = AreaPicker::new(13.0, AreaPickerState::default());
        p.begin_edit(14.0).unwrap();
        assert_eq!(p.save(), Err(PickerError::NoDraft));
        p.update_draft(area()).unwrap();
        assert_eq!(p.save(), Ok((None, area())));
        assert!(p.is_saving());
        let state = p.confirm_saved(7).unwrap();
        assert_eq!(state.id, Some(7));
        assert_eq!(state.bounds, Some(area()));
        assert!(!p.is_editing());
    }

    #[test]
    fn requires_detail_zoom() {
        let mut p = AreaPicker::new(13.0, AreaPickerState::default());
        assert!(matches!(p.begin_edit(12.0), Err(PickerError::ZoomTooLow { .. })));
        assert_eq!(p.update_draft(area()), Err(PickerError::NotEditing));
    }

    #[test]
    fn zooming_out_cancels_edit_only() {
        let saved = AreaPickerState {
            id: Some(3),
            bounds: Some(area()),
        };
        let mut p = AreaPicker::new(13.0, saved);
        p.begin_edit(13.0).unwrap();
        assert_eq!(p.draft(), Some(area()));
        assert!(!p.on_zoom(13.5));
        assert!(p.on_zoom(12.0));
        assert!(!p.is_editing());
        assert_eq!(p.state(), &saved);
        assert!(!p.on_zoom(5.0));
    }

    #[test]
    fn failed_save_returns_to_editing() {
        let mut p = AreaPicker::new(13.0, AreaPickerState::default());
        p.begin_edit(15.0).unwrap();
        p.update_draft(area()).unwrap();
        p.save().unwrap();
        p.abort_save().unwrap();
        assert!(p.is_editing());
        assert_eq!(p.draft(), Some(area()));
        assert_eq!(p.confirm_saved(1), Err(PickerError::NotSaving));
    }

    #[test]
    fn rejects_degenerate_draft() {
        let mut p = AreaPicker::new(13.0, AreaPickerState::default());
        p.begin_edit(15.0).unwrap();
        let inverted = BoundingBox::new(26.0, 121.0, 25.0, 122.0);
        assert_eq!(p.update_draft(inverted), Err(PickerError::DegenerateBounds));
    }
}
