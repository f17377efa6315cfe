// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Captured exporter documents, trimmed to a few entries each

#![allow(dead_code)]

pub const METRICS_PAYLOAD: &str = r#"{"data":{"metrics":[{"name":"active_energy","units":"kJ","data":[{"qty":0.7685677437484512,"date":"2021-12-24 00:04:00 +0800"},{"qty":0.377848256251549,"date":"2021-12-24 00:05:00 +0800"}]},{"name":"basal_body_temperature","units":"degC","data":null}]}}"#;

pub const HEART_RATE_PAYLOAD: &str = r#"{
  "data": {
    "metrics": [
      {
        "name": "heart_rate",
        "units": "count/min",
        "data": [
          {"date": "2021-12-24 00:04:00 +0800", "Min": 58, "Avg": 61.5, "Max": 66, "source": "Apple Watch"},
          {"date": "2024-09-21 7:57:00 am +1000", "Min": 60, "Avg": 62, "Max": 64}
        ]
      }
    ]
  }
}"#;

pub const SLEEP_EVENTS_PAYLOAD: &str = r#"{
  "data": {
    "metrics": [
      {
        "name": "sleep_analysis",
        "units": "hr",
        "data": [
          {"startDate": "2021-12-18 02:21:06 +0800", "endDate": "2021-12-18 02:45:06 +0800", "qty": 0.4, "source": "Watch", "value": "Core"},
          {"startDate": "2021-12-18 02:45:06 +0800", "endDate": "2021-12-18 03:10:36 +0800", "qty": 0.425, "source": "Watch", "value": "REM"}
        ]
      }
    ]
  }
}"#;

pub const AGGREGATED_SLEEP_PAYLOAD: &str = r#"{
  "data": {
    "metrics": [
      {
        "name": "sleep_analysis",
        "units": "hr",
        "data": [
          {
            "date": "2021-12-18 09:03:36 +0800",
            "sleepStart": "2021-12-18 02:21:06 +0800",
            "sleepEnd": "2021-12-18 08:57:06 +0800",
            "sleepSource": "Irvin’s Apple Watch",
            "asleep": 6.119444444444444,
            "inBedStart": "2021-12-18 02:12:50 +0800",
            "inBedEnd": "2021-12-18 09:04:45 +0800",
            "inBedSource": "iPhone",
            "inBed": 6.865277777777778
          }
        ]
      }
    ]
  }
}"#;

pub const WORKOUT_PAYLOAD: &str = r#"{
  "data": {
    "workouts": [
      {
        "name": "Walking",
        "start": "2021-12-24 08:02:43 +0800",
        "end": "2021-12-24 08:21:53 +0800",
        "stepCount": {"qty": 908, "units": "steps"},
        "activeEnergy": {"qty": 226.2, "units": "kJ"},
        "stepCadence": {"qty": 47.4, "units": "spm"},
        "location": "Outdoor",
        "elevation": {"units": "m", "ascent": 16.36, "descent": 0},
        "heartRateData": [
          {"date": "2021-12-24 08:03:00 +0800", "qty": 93, "units": "count/min"}
        ],
        "heartRateRecovery": [
          {"date": "2021-12-24 08:22:00 +0800", "qty": 101, "units": "count/min"}
        ],
        "route": [
          {"lat": 1.3521, "lon": 103.8198, "altitude": 15.2, "timestamp": "2021-12-24 08:02:45 +0800"}
        ]
      }
    ]
  }
}"#;
