pub const TOPIC_SENSOR_ROOM_TEMP: &str = "heatpump/sensor/room_temperature";
pub const TOPIC_SENSOR_OUTSIDE_TEMP: &str = "heatpump/sensor/outside_temperature";

/// Helper states arrive on `heatpump/helper/<name>`.
pub const TOPIC_HELPER_PREFIX: &str = "heatpump/helper/";
pub const TOPIC_HELPER_WILDCARD: &str = "heatpump/helper/+";

pub const TOPIC_CONTROLLER_STATE: &str = "heatpump/controller/state";
pub const TOPIC_DEVICE_ACTION: &str = "heatpump/device/action";

pub const TOPIC_CMD_POWER: &str = "heatpump/cmnd/power";
pub const TOPIC_CMD_TARGET: &str = "heatpump/cmnd/target";
pub const TOPIC_CMD_CLIMATE: &str = "heatpump/cmnd/climate";
pub const TOPIC_CMD_CLIMATE_TARGET: &str = "heatpump/cmnd/climate/target";
pub const TOPIC_CMD_FIX: &str = "heatpump/cmnd/fix";
pub const TOPIC_CMD_SCHEDULE: &str = "heatpump/cmnd/schedule";
pub const TOPIC_CMD_SCHEDULE_ATTRIBUTES: &str = "heatpump/cmnd/schedule/attributes";
