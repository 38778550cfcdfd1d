diesel::table! {
    bookings (id) {
        id -> Int8,
        hotel_id -> Int8,
        room_id -> Uuid,
        user_id -> Int8,
        check_in -> Date,
        check_out -> Date,
        guest_count -> Int4,
        status -> Varchar,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        topic -> Varchar,
        partition_key -> Varchar,
        payload -> Jsonb,
        processed -> Bool,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    bookings,
    outbox_events,
);
