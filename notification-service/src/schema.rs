diesel::table! {
    notifications (id) {
        id -> Int8,
        user_id -> Int8,
        message -> Text,
        kind -> Varchar,
        source_key -> Varchar,
        seen -> Bool,
        created_at -> Nullable<Timestamptz>,
    }
}
