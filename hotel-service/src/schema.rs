diesel::table! {
    hotels (id) {
        id -> Int8,
        name -> Varchar,
        location -> Varchar,
        description -> Nullable<Text>,
        image -> Nullable<Varchar>,
        base_price -> Numeric,
        room_count -> Int4,
        admin_id -> Int8,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    rooms (id) {
        id -> Uuid,
        hotel_id -> Int8,
        guest_count -> Int4,
        kind -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    room_availability (id) {
        id -> Uuid,
        room_id -> Uuid,
        date -> Date,
        available_count -> Int4,
    }
}

diesel::joinable!(rooms -> hotels (hotel_id));
diesel::joinable!(room_availability -> rooms (room_id));

diesel::allow_tables_to_appear_in_same_query!(
    hotels,
    rooms,
    room_availability,
);
