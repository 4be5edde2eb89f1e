/// One station with a trigger, two companions and a callback tag.
pub const TRIGGER_LINE: &str = r#"
{
  "settings": {
    "default_scan_rate_ms": 10,
    "forward_timeout_ms": 500
  },
  "channels": [
    {
      "id": 1,
      "name": "line1",
      "driver": "simulator",
      "devices": [
        {
          "id": 1,
          "name": "plc1",
          "host": "127.0.0.1",
          "port": 102,
          "tag_groups": [
            {
              "id": 1,
              "name": "station1",
              "tags": [
                {
                  "id": 10,
                  "name": "Trigger",
                  "address": "DB10.0",
                  "data_type": "int16",
                  "flag": "trigger",
                  "normal_tags": [
                    { "id": 11, "name": "Count", "address": "DB10.2", "data_type": "int16" },
                    { "id": 12, "name": "Weight", "address": "DB10.4", "data_type": "float32" }
                  ]
                }
              ],
              "callback_tags": [
                { "id": 13, "name": "Result", "address": "DB10.8", "data_type": "int32" }
              ]
            }
          ]
        }
      ]
    }
  ]
}
"#;

/// Heartbeat, notice and switch tags on one device.
pub const SIGNAL_LINE: &str = r#"
{
  "settings": {
    "default_scan_rate_ms": 10,
    "switch_sample_rate_ms": 10
  },
  "channels": [
    {
      "id": 2,
      "name": "line2",
      "driver": "simulator",
      "devices": [
        {
          "id": 2,
          "name": "plc2",
          "host": "127.0.0.1",
          "pool_size": 2,
          "tags": [
            {
              "id": 20,
              "name": "Alive",
              "address": "DB20.0",
              "data_type": "bit",
              "flag": "heartbeat",
              "auto_ack": true
            },
            {
              "id": 30,
              "name": "Temperature",
              "address": "DB30.0",
              "data_type": "int16",
              "flag": "notice",
              "normal_tags": [
                { "id": 31, "name": "Setpoint", "address": "DB30.2", "data_type": "int16" }
              ]
            },
            {
              "id": 40,
              "name": "Recording",
              "address": "DB40.0",
              "data_type": "bit",
              "flag": "switch",
              "normal_tags": [
                { "id": 41, "name": "Pressure", "address": "DB40.2", "data_type": "float32" }
              ]
            }
          ]
        }
      ]
    }
  ]
}
"#;

pub const BAD_PAYLOAD: &str = r#"
{
  "channels": [
    { "id": 1, "name": "line1", "devices": [] }
  ]
}
"#;
