/// Extra dimension holding the predicted classification code of each point
pub const PREDICTED_CLASSIFICATION_CHANNEL: &str = "PredictedClassification";

/// Extra dimension holding the Shannon entropy of the class probabilities
pub const ENTROPY_CHANNEL: &str = "entropy";

// Feature channel names shared by the feature schemas

pub const INTENSITY: &str = "intensity";
pub const RETURN_NUM: &str = "return_num";
pub const NUM_RETURNS: &str = "num_returns";
pub const RED: &str = "red";
pub const GREEN: &str = "green";
pub const BLUE: &str = "blue";
pub const NIR: &str = "nir";
pub const RGB_AVG: &str = "rgb_avg";
pub const NDVI: &str = "ndvi";
