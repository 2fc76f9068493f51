// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

// The national address reference table. Loaded from the AddressBase Plus CSV
// distribution by an external one-off; the geometry column is maintained in
// PostGIS and never read through diesel, so it is not declared here.
table! {
    ab_plus (id) {
        id -> Int8,
        uprn -> Nullable<Int8>,
        os_address_toid -> Nullable<Text>,
        udprn -> Nullable<Int4>,
        organisation_name -> Nullable<Text>,
        department_name -> Nullable<Text>,
        po_box_number -> Nullable<Text>,
        sub_building_name -> Nullable<Text>,
        building_name -> Nullable<Text>,
        building_number -> Nullable<Text>,
        dependent_thoroughfare -> Nullable<Text>,
        thoroughfare -> Nullable<Text>,
        post_town -> Nullable<Text>,
        double_dependent_locality -> Nullable<Text>,
        dependent_locality -> Nullable<Text>,
        postcode -> Nullable<Text>,
        postcode_type -> Nullable<Bpchar>,
        x_coordinate -> Nullable<Float8>,
        y_coordinate -> Nullable<Float8>,
        latitude -> Nullable<Float8>,
        longitude -> Nullable<Float8>,
        rpc -> Nullable<Int4>,
        country -> Nullable<Bpchar>,
        change_type -> Nullable<Bpchar>,
        la_start_date -> Nullable<Date>,
        rm_start_date -> Nullable<Date>,
        last_update_date -> Nullable<Date>,
        class -> Nullable<Bpchar>,
    }
}
