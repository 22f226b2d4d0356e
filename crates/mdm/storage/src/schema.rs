//! Diesel schema definitions.

diesel::table! {
    enrollments (id) {
        id -> Text,
        device_id -> Text,
        user_id -> Nullable<Text>,
        enroll_type -> Integer,
        topic -> Text,
        push_magic -> Text,
        token_hex -> Text,
        enabled -> Bool,
        token_update_tally -> Integer,
        last_seen_at -> Timestamp,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    devices (id) {
        id -> Text,
        identity_cert_fingerprint -> Nullable<Text>,
        serial_number -> Nullable<Text>,
        authenticate -> Nullable<Binary>,
        authenticate_at -> Nullable<Timestamp>,
        token_update -> Nullable<Binary>,
        token_update_at -> Nullable<Timestamp>,
        unlock_token -> Nullable<Binary>,
        unlock_token_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    users (id) {
        id -> Text,
        device_id -> Text,
        user_short_name -> Nullable<Text>,
        user_long_name -> Nullable<Text>,
        user_authenticate -> Nullable<Binary>,
        user_authenticate_at -> Nullable<Timestamp>,
        user_authenticate_digest -> Nullable<Binary>,
        user_authenticate_digest_at -> Nullable<Timestamp>,
        token_update -> Nullable<Binary>,
        token_update_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    push_certs (topic) {
        topic -> Text,
        cert_pem -> Text,
        key_pem -> Text,
        issued_at -> BigInt,
    }
}

diesel::table! {
    commands (id) {
        id -> Integer,
        enrollment_id -> Text,
        uuid -> Text,
        command -> Binary,
        created_at -> Timestamp,
    }
}

diesel::joinable!(commands -> enrollments (enrollment_id));
diesel::joinable!(users -> devices (device_id));

diesel::allow_tables_to_appear_in_same_query!(enrollments, devices, users, push_certs, commands,);
