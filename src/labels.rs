/// Object classes annotated in the underwater dataset, ordered by model
/// class id starting at 1. Index 0 is reserved for the background class.
pub const CLASS_NAMES: [&str; 3] = ["seacucumber", "seaurchin", "scallop"];

/// Maps between annotation class names and the compact model id space.
///
/// Cross-entropy loss uses integer class indices directly instead of one-hot
/// encodings, so every class carries a fixed small id: 0 is background, ids
/// 1..=3 are the annotated species in `CLASS_NAMES` order.
#[derive(Clone)]
pub struct ClassMap;

impl ClassMap {
    pub fn new() -> Self {
        ClassMap
    }

    /// Total number of model classes including the background class.
    pub fn count(&self) -> usize {
        CLASS_NAMES.len() + 1
    }

    /// Annotated class names, ordered by model id (starting at 1).
    /// Background is excluded.
    pub fn names(&self) -> Vec<String> {
        CLASS_NAMES.iter().map(|n| n.to_string()).collect()
    }

    /// Maps a model class id back to its annotation name.
    ///
    /// Background is returned for id `0`.
    pub fn id_to_name(&self, model_id: &usize) -> &'static str {
        if *model_id == 0 {
            return "background";
        }
        CLASS_NAMES[*model_id - 1]
    }

    /// Maps an annotation class name to its model id.
    ///
    /// # Returns
    ///
    /// `Some(model_id)` (1-based, 0 is background) if the name is one of the
    /// annotated classes, otherwise `None`.
    pub fn name_to_id(&self, name: &str) -> Option<usize> {
        CLASS_NAMES.iter().position(|n| *n == name).map(|i| i + 1)
    }
}

impl Default for ClassMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_map_round_trip() {
        let cm = ClassMap::new();

        assert_eq!(cm.count(), 4);
        assert_eq!(cm.name_to_id("seacucumber").unwrap(), 1);
        assert_eq!(cm.name_to_id("seaurchin").unwrap(), 2);
        assert_eq!(cm.name_to_id("scallop").unwrap(), 3);
        assert_eq!(cm.name_to_id("starfish"), Option::None);

        assert_eq!(cm.id_to_name(&0), "background");
        assert_eq!(cm.id_to_name(&1), "seacucumber");
        assert_eq!(cm.id_to_name(&2), "seaurchin");
        assert_eq!(cm.id_to_name(&3), "scallop");

        assert_eq!(cm.names(), vec!["seacucumber", "seaurchin", "scallop"]);
    }
}
