// Mirrors the table created and evolved by `db::migrations`.

diesel::table! {
    readings (id) {
        id -> Integer,
        device_id -> Text,
        timestamp -> BigInt,
        temperature -> Double,
        smoke_value -> Integer,
        fire_value -> Integer,
        temp_alert -> Bool,
        smoke_alert -> Bool,
        fire_alert -> Bool,
        smoke_connected -> Nullable<Bool>,
        mq2_preheated -> Nullable<Bool>,
        fire_detected -> Nullable<Bool>,
        alert_active -> Nullable<Bool>,
        created_at -> Timestamp,
    }
}
