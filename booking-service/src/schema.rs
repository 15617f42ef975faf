diesel::table! {
    bookings (id) {
        id -> Uuid,
        service_id -> Uuid,
        user_id -> Nullable<Uuid>,
        guest_name -> Nullable<Varchar>,
        guest_email -> Nullable<Varchar>,
        guest_phone -> Nullable<Varchar>,
        start_time -> Timestamptz,
        end_time -> Timestamptz,
        status -> Varchar,
        total_amount -> Numeric,
        notes -> Nullable<Text>,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    inquiries (id) {
        id -> Uuid,
        name -> Varchar,
        email -> Varchar,
        phone -> Varchar,
        start_date -> Date,
        end_date -> Date,
        message -> Nullable<Text>,
        dog_picture_url -> Nullable<Varchar>,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        aggregate_id -> Uuid,
        event_type -> Varchar,
        event_data -> Jsonb,
        processed -> Nullable<Bool>,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    payments (id) {
        id -> Uuid,
        booking_id -> Uuid,
        stripe_payment_intent_id -> Varchar,
        amount -> Numeric,
        status -> Varchar,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    services (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Text,
        price -> Numeric,
        duration_hours -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    sessions (token) {
        token -> Varchar,
        user_id -> Uuid,
        expires_at -> Timestamptz,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Varchar,
        name -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        stripe_customer_id -> Nullable<Varchar>,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(bookings -> services (service_id));
diesel::joinable!(bookings -> users (user_id));
diesel::joinable!(payments -> bookings (booking_id));
diesel::joinable!(sessions -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    bookings,
    inquiries,
    outbox_events,
    payments,
    services,
    sessions,
    users,
);
